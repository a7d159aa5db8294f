use super::entity::DataSourceBindings;
use std::any::TypeId;
use std::fmt;

/// A module of entity types sharing default data-source bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    name: String,
    data_sources: DataSourceBindings,
}

impl RepositoryDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_sources: DataSourceBindings::default(),
        }
    }

    pub fn data_source(mut self, name: impl Into<String>) -> Self {
        self.data_sources.primary = Some(name.into());
        self
    }

    pub fn secondary_source(mut self, name: impl Into<String>) -> Self {
        self.data_sources.secondary = Some(name.into());
        self
    }

    pub fn version_source(mut self, name: impl Into<String>) -> Self {
        self.data_sources.version = Some(name.into());
        self
    }

    pub fn trash_source(mut self, name: impl Into<String>) -> Self {
        self.data_sources.trash = Some(name.into());
        self
    }

    pub fn sync_source(mut self, name: impl Into<String>) -> Self {
        self.data_sources.sync = Some(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_sources(&self) -> &DataSourceBindings {
        &self.data_sources
    }
}

/// Implemented by the marker type of a repository module.
///
/// ```ignore
/// struct NewsRepository;
///
/// impl RepositoryModule for NewsRepository {
///     fn descriptor() -> RepositoryDescriptor {
///         RepositoryDescriptor::new("News").data_source("main")
///     }
/// }
/// ```
pub trait RepositoryModule: 'static {
    fn descriptor() -> RepositoryDescriptor;
}

/// Typed back-reference from an entity declaration to its owning repository.
#[derive(Clone, Copy)]
pub struct RepositoryRef {
    type_id: TypeId,
    type_name: &'static str,
    descriptor: fn() -> RepositoryDescriptor,
}

impl RepositoryRef {
    pub fn of<R: RepositoryModule>() -> Self {
        Self {
            type_id: TypeId::of::<R>(),
            type_name: std::any::type_name::<R>(),
            descriptor: R::descriptor,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn descriptor(&self) -> RepositoryDescriptor {
        (self.descriptor)()
    }
}

impl PartialEq for RepositoryRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for RepositoryRef {}

impl fmt::Debug for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryRef")
            .field("type_name", &self.type_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Billing;

    impl RepositoryModule for Billing {
        fn descriptor() -> RepositoryDescriptor {
            RepositoryDescriptor::new("Billing")
                .data_source("main")
                .trash_source("trash")
        }
    }

    #[test]
    fn test_repository_ref_resolves_descriptor() {
        let reference = RepositoryRef::of::<Billing>();
        let descriptor = reference.descriptor();

        assert_eq!(descriptor.name(), "Billing");
        assert_eq!(descriptor.data_sources().primary.as_deref(), Some("main"));
        assert_eq!(descriptor.data_sources().trash.as_deref(), Some("trash"));
        assert_eq!(reference, RepositoryRef::of::<Billing>());
        assert!(reference.type_name().ends_with("Billing"));
    }
}
