use super::attribute::AttributeDescriptor;
use super::entity::{
    DataSourceNames, Entity, EntityDef, EntityDescriptor, EntityShape, StorageTarget,
};
use super::settings::EntitySettings;
use crate::core::{MapperError, Result};
use crate::datasource::{DataSource, DataSourceDirectory};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Registered descriptors, indexed by type and by entity name.
///
/// Copy-on-write: writers build a new map and swap the `Arc`, readers clone
/// the `Arc` under a short read lock and never wait on descriptor building.
#[derive(Default, Clone)]
struct Catalog {
    by_type: Arc<HashMap<TypeId, Arc<EntityDescriptor>>>,
    by_name: Arc<HashMap<String, TypeId>>,
}

impl Catalog {
    fn get(&self, type_id: &TypeId) -> Option<Arc<EntityDescriptor>> {
        self.by_type.get(type_id).cloned()
    }

    fn with_entity(&self, type_id: TypeId, descriptor: Arc<EntityDescriptor>) -> Self {
        let mut by_type = (*self.by_type).clone();
        let mut by_name = (*self.by_name).clone();
        by_name.insert(descriptor.owner_type().to_string(), type_id);
        by_type.insert(type_id, descriptor);
        Self {
            by_type: Arc::new(by_type),
            by_name: Arc::new(by_name),
        }
    }
}

/// Builds and caches one [`EntityDescriptor`] per entity type.
pub struct SchemaRegistry {
    directory: Arc<DataSourceDirectory>,
    catalog: RwLock<Catalog>,
}

impl SchemaRegistry {
    pub fn new(directory: DataSourceDirectory) -> Self {
        Self::with_directory(Arc::new(directory))
    }

    pub fn with_directory(directory: Arc<DataSourceDirectory>) -> Self {
        Self {
            directory,
            catalog: RwLock::new(Catalog::default()),
        }
    }

    pub fn directory(&self) -> &Arc<DataSourceDirectory> {
        &self.directory
    }

    /// Register `T`, building its descriptor on first call. Idempotent.
    pub fn register<T: Entity>(&self) -> Result<Arc<EntityDescriptor>> {
        let type_id = TypeId::of::<T>();
        if let Some(existing) = self.catalog.read()?.get(&type_id) {
            return Ok(existing);
        }

        let descriptor = Arc::new(self.build_descriptor(
            T::entity_def(),
            std::any::type_name::<T>(),
        )?);

        let mut catalog = self.catalog.write()?;
        if let Some(existing) = catalog.get(&type_id) {
            // lost the race to another registration of the same type
            return Ok(existing);
        }
        if let Some(other) = catalog.by_name.get(descriptor.owner_type()) {
            if *other != type_id {
                return Err(MapperError::SchemaError(format!(
                    "Entity name '{}' is already registered by another type",
                    descriptor.owner_type()
                )));
            }
        }

        *catalog = catalog.with_entity(type_id, Arc::clone(&descriptor));
        info!(
            entity = descriptor.owner_type(),
            storage = %descriptor.storage(),
            primary_key = descriptor.primary_key_name(),
            data_source = %descriptor.data_sources().primary,
            "registered entity"
        );
        Ok(descriptor)
    }

    pub fn is_registered<T: Entity>(&self) -> bool {
        self.catalog
            .read()
            .map(|catalog| catalog.by_type.contains_key(&TypeId::of::<T>()))
            .unwrap_or(false)
    }

    /// Descriptor of a registered type.
    pub fn descriptor<T: Entity>(&self) -> Result<Arc<EntityDescriptor>> {
        self.catalog
            .read()?
            .get(&TypeId::of::<T>())
            .ok_or_else(|| MapperError::NotRegistered(std::any::type_name::<T>().to_string()))
    }

    pub fn descriptor_by_name(&self, entity: &str) -> Result<Arc<EntityDescriptor>> {
        let catalog = self.catalog.read()?;
        catalog
            .by_name
            .get(entity)
            .and_then(|type_id| catalog.get(type_id))
            .ok_or_else(|| MapperError::NotRegistered(entity.to_string()))
    }

    /// All registered descriptors, ordered by entity name.
    pub fn entities(&self) -> Result<Vec<Arc<EntityDescriptor>>> {
        let catalog = self.catalog.read()?;
        let mut entities: Vec<_> = catalog.by_type.values().cloned().collect();
        entities.sort_by(|a, b| a.owner_type().cmp(b.owner_type()));
        Ok(entities)
    }

    /// Primary data source of a registered type.
    pub fn data_source<T: Entity>(&self) -> Result<Arc<DataSource>> {
        let descriptor = self.descriptor::<T>()?;
        self.directory.resolve(&descriptor.data_sources().primary)
    }

    /// Re-bind data sources and cache parameters of a registered type.
    pub fn update_settings<T: Entity>(&self, json: &str) -> Result<Arc<EntityDescriptor>> {
        let type_id = TypeId::of::<T>();
        self.update_settings_for(type_id, std::any::type_name::<T>(), json)
    }

    pub fn update_settings_by_name(
        &self,
        entity: &str,
        json: &str,
    ) -> Result<Arc<EntityDescriptor>> {
        let type_id = self
            .catalog
            .read()?
            .by_name
            .get(entity)
            .copied()
            .ok_or_else(|| MapperError::NotRegistered(entity.to_string()))?;
        self.update_settings_for(type_id, entity, json)
    }

    fn update_settings_for(
        &self,
        type_id: TypeId,
        label: &str,
        json: &str,
    ) -> Result<Arc<EntityDescriptor>> {
        let settings = EntitySettings::from_json(json)?;
        self.directory.ensure_known(settings.referenced_sources())?;

        let mut catalog = self.catalog.write()?;
        let current = catalog
            .get(&type_id)
            .ok_or_else(|| MapperError::NotRegistered(label.to_string()))?;

        let (names, cache) = settings.apply(current.data_sources(), current.cache())?;
        let updated = Arc::new(current.rebind(names, cache));
        *catalog = catalog.with_entity(type_id, Arc::clone(&updated));

        debug!(entity = updated.owner_type(), "entity settings updated");
        Ok(updated)
    }

    /// Turn declared metadata into a descriptor without registering it.
    pub fn build_descriptor(&self, def: EntityDef, rust_type: &'static str) -> Result<EntityDescriptor> {
        let storage = resolve_storage(&def)?;

        let mut attributes = Vec::with_capacity(def.attributes.len());
        let mut ignored_members = Vec::new();
        let mut seen_members = HashSet::new();
        let mut seen_columns = HashSet::new();

        for attr_def in &def.attributes {
            if !seen_members.insert(attr_def.member.clone()) {
                return Err(schema_error(
                    &def,
                    format!("member '{}' is declared twice", attr_def.member),
                ));
            }
            if attr_def.ignored {
                ignored_members.push(attr_def.member.clone());
                continue;
            }
            let attr = AttributeDescriptor::resolve(attr_def)?;
            if !seen_columns.insert(attr.document_field().to_string()) {
                return Err(schema_error(
                    &def,
                    format!("column '{}' is mapped by more than one member", attr.column()),
                ));
            }
            attributes.push(attr);
        }

        let primary_keys: Vec<&AttributeDescriptor> =
            attributes.iter().filter(|a| a.is_primary_key()).collect();
        let primary_key = match primary_keys.as_slice() {
            [single] => single.name().to_string(),
            [] => return Err(schema_error(&def, "no primary key member declared")),
            many => {
                let names: Vec<&str> = many.iter().map(|a| a.name()).collect();
                return Err(schema_error(
                    &def,
                    format!("multiple primary key members declared: {}", names.join(", ")),
                ));
            }
        };

        for parent in &def.parents {
            if !attributes.iter().any(|a| a.name() == parent.property) {
                return Err(schema_error(
                    &def,
                    format!(
                        "parent association property '{}' (parent '{}') is not a mapped member",
                        parent.property, parent.parent_type
                    ),
                ));
            }
        }

        let repository = def.repository.map(|reference| reference.descriptor());
        let bindings = match &repository {
            Some(repo) => def.data_sources.inherit(repo.data_sources()),
            None => def.data_sources.clone(),
        };
        let primary = bindings
            .primary
            .clone()
            .ok_or_else(|| schema_error(&def, "no primary data source bound"))?;
        let names = DataSourceNames {
            primary,
            secondary: bindings.secondary,
            version: bindings.version,
            trash: bindings.trash,
            sync: bindings.sync,
        };
        self.directory.ensure_known(names.all())?;

        let mut sortable = vec![primary_key.clone()];
        sortable.extend(
            attributes
                .iter()
                .filter(|a| a.is_sortable() && !a.is_primary_key())
                .map(|a| a.name().to_string()),
        );

        let by_name = attributes
            .iter()
            .enumerate()
            .map(|(idx, a)| (a.name().to_string(), idx))
            .collect();
        let by_column = attributes
            .iter()
            .enumerate()
            .map(|(idx, a)| (a.column().to_string(), idx))
            .collect();

        let shape = EntityShape {
            owner_type: def.name.clone(),
            rust_type,
            storage,
            primary_key,
            attributes,
            by_name,
            by_column,
            sortable,
            ignored_members,
            extendable: def.extendable,
            parents: def.parents.clone(),
            repository: repository.map(|repo| repo.name().to_string()),
        };

        Ok(EntityDescriptor::new(shape, names, def.cache.clone()))
    }
}

fn resolve_storage(def: &EntityDef) -> Result<StorageTarget> {
    let table = def.table_name.as_deref().filter(|n| !n.is_empty());
    let collection = def.collection_name.as_deref().filter(|n| !n.is_empty());
    match (table, collection) {
        (Some(table), None) => Ok(StorageTarget::Table(table.to_string())),
        (None, Some(collection)) => Ok(StorageTarget::Collection(collection.to_string())),
        (None, None) => Err(schema_error(def, "declares neither a table nor a collection name")),
        (Some(_), Some(_)) => Err(schema_error(def, "declares both a table and a collection name")),
    }
}

fn schema_error(def: &EntityDef, reason: impl AsRef<str>) -> MapperError {
    MapperError::SchemaError(format!("entity '{}' {}", def.name, reason.as_ref()))
}
