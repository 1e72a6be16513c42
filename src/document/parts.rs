//! Document parts registry
//!
//! A part is a record that has no validity interval of its own: it belongs
//! to a master document, and is valid whenever its master version is. Each
//! part declares its references (`field -> target type`) and may name the
//! reference leading to its master explicitly. The master document type is
//! resolved when the part is registered, so a part whose master cannot be
//! determined is rejected before it is ever used.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::errors::{DocumentError, DocumentResult};

/// Declaration of a document part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartSpec {
    pub name: String,
    /// Reference fields and the type each one points to
    #[serde(default)]
    pub references: BTreeMap<String, String>,
    /// Reference field leading to the master, when it is not the only
    /// reference to a registered type
    #[serde(default)]
    pub master: Option<String>,
}

impl PartSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            references: BTreeMap::new(),
            master: None,
        }
    }

    pub fn reference(mut self, field: impl Into<String>, target: impl Into<String>) -> Self {
        self.references.insert(field.into(), target.into());
        self
    }

    pub fn master(mut self, field: impl Into<String>) -> Self {
        self.master = Some(field.into());
        self
    }
}

/// Registered document types and parts.
#[derive(Debug, Clone, Default)]
pub struct DocumentRegistry {
    documents: BTreeSet<String>,
    /// Part name to the document type it ultimately belongs to
    parts: BTreeMap<String, String>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a versioned document type.
    pub fn register_document(&mut self, name: impl Into<String>) -> DocumentResult<()> {
        let name = name.into();
        if self.is_registered(&name) {
            return Err(DocumentError::Configuration(format!(
                "type '{}' registered twice",
                name
            )));
        }
        self.documents.insert(name);
        Ok(())
    }

    /// Registers a part and returns its master document type. Every type
    /// between the part and its master must already be registered.
    pub fn register_part(&mut self, spec: &PartSpec) -> DocumentResult<&str> {
        if self.is_registered(&spec.name) {
            return Err(DocumentError::Configuration(format!(
                "type '{}' registered twice",
                spec.name
            )));
        }
        let master = self.resolve(spec)?;
        Ok(self.parts.entry(spec.name.clone()).or_insert(master).as_str())
    }

    fn resolve(&self, spec: &PartSpec) -> DocumentResult<String> {
        let (field, target) = match &spec.master {
            Some(field) => {
                let target = spec.references.get(field).ok_or_else(|| {
                    DocumentError::Configuration(format!(
                        "part '{}': master field '{}' is not a declared reference",
                        spec.name, field
                    ))
                })?;
                if !self.is_registered(target) {
                    return Err(DocumentError::Configuration(format!(
                        "part '{}': master field '{}' points to unknown type '{}'",
                        spec.name, field, target
                    )));
                }
                (field, target)
            }
            None => {
                let candidates: Vec<(&String, &String)> = spec
                    .references
                    .iter()
                    .filter(|(_, target)| self.is_registered(target))
                    .collect();
                match candidates.as_slice() {
                    [single] => *single,
                    [] => {
                        return Err(DocumentError::Configuration(format!(
                            "part '{}': master not found, declare the master field",
                            spec.name
                        )))
                    }
                    many => {
                        let fields: Vec<&str> = many.iter().map(|(f, _)| f.as_str()).collect();
                        return Err(DocumentError::Configuration(format!(
                            "part '{}': ambiguous master ({}), declare the master field",
                            spec.name,
                            fields.join(", ")
                        )));
                    }
                }
            }
        };

        if self.documents.contains(target) {
            return Ok(target.clone());
        }
        self.parts.get(target).cloned().ok_or_else(|| {
            DocumentError::Configuration(format!(
                "part '{}': unknown type '{}' behind field '{}'",
                spec.name, target, field
            ))
        })
    }

    /// True for registered documents and parts.
    pub fn is_registered(&self, name: &str) -> bool {
        self.documents.contains(name) || self.parts.contains_key(name)
    }

    pub fn is_document(&self, name: &str) -> bool {
        self.documents.contains(name)
    }

    /// Registered document types, sorted.
    pub fn documents(&self) -> impl Iterator<Item = &str> {
        self.documents.iter().map(String::as_str)
    }

    /// The document type a part belongs to.
    pub fn master_document(&self, part: &str) -> DocumentResult<&str> {
        self.parts.get(part).map(String::as_str).ok_or_else(|| {
            DocumentError::Configuration(format!("'{}' is not a registered part", part))
        })
    }

    /// Registered parts with their master document types, sorted by name.
    pub fn parts(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parts
            .iter()
            .map(|(name, master)| (name.as_str(), master.as_str()))
    }
}
