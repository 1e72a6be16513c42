//! Observable events
//!
//! Events are explicit and typed; the logger renders them by name.

use std::fmt;

/// Observable events in chronodoc
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Tables
    /// Table opened and journal replayed
    TableOpened,
    /// Incomplete trailing journal frame discarded on open
    JournalTornTail,
    /// Journal corruption detected (FATAL)
    JournalCorruption,

    // Version store
    /// New version written
    VersionSaved,
    /// Guarded close found the prior version already closed
    VersionConflict,
    /// Open version closed by delete
    DocumentDeleted,
    /// Earlier version reopened as a new version
    DocumentRestored,
    /// Batch of versions written
    BulkSaved,
    /// Batch of documents closed
    BulkDeleted,

    // Scanning
    /// Window plan computed
    ScanPlanned,
    /// One window fetched
    ScanWindow,
    /// Scan stopped by cancellation
    ScanCancelled,

    // Catalog
    /// Configuration loaded and validated
    ConfigLoaded,
    /// Catalog opened
    CatalogOpened,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::TableOpened => "TABLE_OPENED",
            Event::JournalTornTail => "JOURNAL_TORN_TAIL",
            Event::JournalCorruption => "JOURNAL_CORRUPTION",

            Event::VersionSaved => "VERSION_SAVED",
            Event::VersionConflict => "VERSION_CONFLICT",
            Event::DocumentDeleted => "DOCUMENT_DELETED",
            Event::DocumentRestored => "DOCUMENT_RESTORED",
            Event::BulkSaved => "BULK_SAVED",
            Event::BulkDeleted => "BULK_DELETED",

            Event::ScanPlanned => "SCAN_PLANNED",
            Event::ScanWindow => "SCAN_WINDOW",
            Event::ScanCancelled => "SCAN_CANCELLED",

            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::CatalogOpened => "CATALOG_OPENED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::JournalCorruption)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
