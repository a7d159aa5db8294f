use super::config::AdapterConfig;
use super::driver::{IndexKind, IndexModel};
use crate::schema::EntityDescriptor;

/// Indexes implied by an entity descriptor.
///
/// - one ascending composite index per distinct index name,
/// - one unique composite index per distinct unique-index name; members that
///   join an ordinary index of the same name are folded into it, so the name
///   yields a single unique index,
/// - one text index over every searchable member.
///
/// Composite keys follow descriptor order. The result is deterministic.
pub fn derive_indexes(descriptor: &EntityDescriptor, config: &AdapterConfig) -> Vec<IndexModel> {
    let mut ordinary: Vec<(&str, Vec<String>)> = Vec::new();
    let mut unique: Vec<(&str, Vec<String>)> = Vec::new();

    for attr in descriptor.attributes() {
        let field = attr.document_field().to_string();
        if let Some(name) = attr.index_name() {
            add_member(&mut ordinary, name, &field);
        }
        if let Some(name) = attr.unique_index_name() {
            add_member(&mut unique, name, &field);
        }
    }

    let entity = descriptor.owner_type();
    let mut indexes = Vec::with_capacity(ordinary.len() + unique.len() + 1);

    for (name, fields) in &ordinary {
        if unique.iter().any(|(unique_name, _)| unique_name == name) {
            continue;
        }
        indexes.push(IndexModel::new(
            config.index_name(entity, name),
            IndexKind::Ascending,
            fields.clone(),
        ));
    }

    for (name, _) in &unique {
        // descriptor order across both memberships
        let fields = descriptor
            .attributes()
            .iter()
            .filter(|attr| {
                attr.unique_index_name() == Some(*name) || attr.index_name() == Some(*name)
            })
            .map(|attr| attr.document_field().to_string())
            .collect();
        indexes.push(IndexModel::new(
            config.index_name(entity, name),
            IndexKind::Unique,
            fields,
        ));
    }

    let searchable: Vec<String> = descriptor
        .searchable_attributes()
        .map(|attr| attr.document_field().to_string())
        .collect();
    if !searchable.is_empty() {
        indexes.push(IndexModel::new(
            config.text_index_name(entity),
            IndexKind::Text,
            searchable,
        ));
    }

    indexes
}

fn add_member<'a>(groups: &mut Vec<(&'a str, Vec<String>)>, name: &'a str, field: &str) {
    match groups.iter_mut().find(|(group, _)| *group == name) {
        Some((_, fields)) => fields.push(field.to_string()),
        None => groups.push((name, vec![field.to_string()])),
    }
}
