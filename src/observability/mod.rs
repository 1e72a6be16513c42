//! Observability
//!
//! Structured JSON logging, typed lifecycle events and begin/complete
//! scopes. Logging is synchronous and has no effect on execution.
//!
//! ```ignore
//! use chronodoc::observability::{log_event_with_fields, Event, ObservationScope};
//!
//! log_event_with_fields(Event::VersionSaved, &[("table", "docs"), ("id", "42")]);
//!
//! let scope = ObservationScope::new("CHECK");
//! // ... do work ...
//! scope.complete();
//! ```

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use scope::{ObservationScope, Timer};

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    if event.is_fatal() {
        Logger::fatal(event.as_str(), fields);
    } else {
        Logger::info(event.as_str(), fields);
    }
}

/// Log a lifecycle event at WARN level
pub fn warn_event(event: Event, fields: &[(&str, &str)]) {
    Logger::warn(event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event(Event::CatalogOpened);
        log_event_with_fields(Event::ConfigLoaded, &[("data_dir", "/tmp/test")]);
        warn_event(Event::JournalTornTail, &[("table", "docs")]);
    }
}
