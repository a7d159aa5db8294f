//! Named data sources.
//!
//! A data source binds a name to a storage mode, a connection identity and a
//! database. Entities reference data sources by name only; the directory
//! resolves those names. Loading the directory from configuration is the
//! host's job.

use crate::core::{MapperError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataSourceMode {
    Sql,
    NoSql,
}

impl fmt::Display for DataSourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql => write!(f, "SQL"),
            Self::NoSql => write!(f, "NoSQL"),
        }
    }
}

/// Immutable connection binding, resolved by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    name: String,
    mode: DataSourceMode,
    connection: String,
    database: String,
}

impl DataSource {
    pub fn new(
        name: impl Into<String>,
        mode: DataSourceMode,
        connection: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mode,
            connection: connection.into(),
            database: database.into(),
        }
    }

    /// Document-store data source
    pub fn nosql(
        name: impl Into<String>,
        connection: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self::new(name, DataSourceMode::NoSql, connection, database)
    }

    /// Relational data source
    pub fn sql(
        name: impl Into<String>,
        connection: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self::new(name, DataSourceMode::Sql, connection, database)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> DataSourceMode {
        self.mode
    }

    pub fn connection(&self) -> &str {
        &self.connection
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn is_document_store(&self) -> bool {
        self.mode == DataSourceMode::NoSql
    }
}

/// Name to data source lookup.
#[derive(Debug, Clone, Default)]
pub struct DataSourceDirectory {
    sources: HashMap<String, Arc<DataSource>>,
}

impl DataSourceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`DataSourceDirectory::insert`]
    pub fn with(mut self, source: DataSource) -> Self {
        self.insert(source);
        self
    }

    /// Add or replace a data source under its own name.
    pub fn insert(&mut self, source: DataSource) -> Option<Arc<DataSource>> {
        self.sources
            .insert(source.name().to_string(), Arc::new(source))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<DataSource>> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| MapperError::UnknownDataSource(name.to_string()))
    }

    /// Fails with `UnknownDataSource` for the first name the directory lacks.
    pub fn ensure_known<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for name in names {
            if !self.contains(name) {
                return Err(MapperError::UnknownDataSource(name.to_string()));
            }
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_and_unknown() {
        let directory = DataSourceDirectory::new()
            .with(DataSource::nosql("main", "mongodb://localhost:27017", "news"))
            .with(DataSource::sql("archive", "postgres://db", "archive"));

        let main = directory.resolve("main").unwrap();
        assert!(main.is_document_store());
        assert_eq!(main.database(), "news");
        assert_eq!(directory.names(), vec!["archive", "main"]);

        match directory.resolve("missing") {
            Err(MapperError::UnknownDataSource(name)) => assert_eq!(name, "missing"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_ensure_known_reports_first_missing() {
        let directory = DataSourceDirectory::new().with(DataSource::nosql("a", "c", "d"));
        assert!(directory.ensure_known(["a"]).is_ok());
        let err = directory.ensure_known(["a", "b", "c"]).unwrap_err();
        assert!(matches!(err, MapperError::UnknownDataSource(name) if name == "b"));
    }
}
