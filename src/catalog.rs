//! Catalog of document types
//!
//! Opens one durable table per configured document type under
//! `<data_dir>/journals/` and registers the configured parts against them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::document::{DocumentError, DocumentRegistry, DocumentResult, VersionStore};
use crate::observability::{log_event_with_fields, Event};
use crate::table::{Table, TableError};

const JOURNAL_DIR: &str = "journals";

pub struct Catalog {
    journal_dir: PathBuf,
    registry: DocumentRegistry,
    stores: BTreeMap<String, VersionStore>,
    scan_window: usize,
}

impl Catalog {
    /// True when `data_dir` holds a catalog.
    pub fn is_initialized(data_dir: &Path) -> bool {
        data_dir.join(JOURNAL_DIR).is_dir()
    }

    /// Creates the directory layout and an empty journal per document type.
    pub fn create(config: &Config) -> DocumentResult<Self> {
        let journal_dir = config.data_path().join(JOURNAL_DIR);
        fs::create_dir_all(&journal_dir).map_err(|e| {
            TableError::io_error(format!("Failed to create {}", journal_dir.display()), e)
        })?;
        Self::open(config)
    }

    /// Opens every configured document type, replaying its journal.
    pub fn open(config: &Config) -> DocumentResult<Self> {
        let journal_dir = config.data_path().join(JOURNAL_DIR);
        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("data_dir", &config.data_dir),
                ("documents", &config.documents.len().to_string()),
                ("parts", &config.parts.len().to_string()),
            ],
        );

        let mut registry = DocumentRegistry::new();
        let mut stores = BTreeMap::new();
        for name in &config.documents {
            registry.register_document(name.as_str())?;
            let table = Table::open(&journal_dir, name.as_str())?;
            let store = VersionStore::new(Arc::new(table)).with_id_strategy(config.id_strategy);
            stores.insert(name.clone(), store);
        }
        for part in &config.parts {
            registry.register_part(part)?;
        }

        log_event_with_fields(
            Event::CatalogOpened,
            &[
                ("journal_dir", &journal_dir.display().to_string()),
                ("tables", &stores.len().to_string()),
            ],
        );

        Ok(Self {
            journal_dir,
            registry,
            stores,
            scan_window: config.scan_window,
        })
    }

    pub fn journal_dir(&self) -> &Path {
        &self.journal_dir
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    pub fn scan_window(&self) -> usize {
        self.scan_window
    }

    /// Names of the document types, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    /// The version store of document type `name`.
    pub fn store(&self, name: &str) -> DocumentResult<&VersionStore> {
        self.stores.get(name).ok_or_else(|| match self.registry.master_document(name) {
            Ok(master) => DocumentError::Configuration(format!(
                "'{}' is a part of '{}' and has no version table of its own",
                name, master
            )),
            Err(_) => DocumentError::Configuration(format!("unknown document type '{}'", name)),
        })
    }

    pub fn stores(&self) -> impl Iterator<Item = (&str, &VersionStore)> {
        self.stores.iter().map(|(name, store)| (name.as_str(), store))
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("journal_dir", &self.journal_dir)
            .field("tables", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}
