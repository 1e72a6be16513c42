//! Operator diagnostics
//!
//! Findings go to two channels: the protocol channel receives every line at
//! or below the verbosity (`i ` info, `w ` warning, `e ` error prefixes);
//! the error channel receives error lines only, whatever the verbosity.

use std::io::{self, Write};

/// How much of the protocol is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Errors only
    Errors = 0,
    /// Errors and warnings
    #[default]
    Warnings = 1,
    /// Everything
    Info = 2,
}

impl From<u8> for Verbosity {
    fn from(level: u8) -> Self {
        match level {
            0 => Verbosity::Errors,
            1 => Verbosity::Warnings,
            _ => Verbosity::Info,
        }
    }
}

/// Lines emitted so far, counted whether or not verbosity let them through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticCounts {
    pub info: usize,
    pub warnings: usize,
    pub errors: usize,
}

/// Two-channel, verbosity-gated diagnostic writer.
pub struct Diagnostics<'a> {
    out: &'a mut dyn Write,
    err: &'a mut dyn Write,
    verbosity: Verbosity,
    counts: DiagnosticCounts,
}

impl<'a> Diagnostics<'a> {
    pub fn new(out: &'a mut dyn Write, err: &'a mut dyn Write, verbosity: Verbosity) -> Self {
        Self {
            out,
            err,
            verbosity,
            counts: DiagnosticCounts::default(),
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn counts(&self) -> DiagnosticCounts {
        self.counts
    }

    pub fn info(&mut self, message: &str) -> io::Result<()> {
        self.counts.info += 1;
        if self.verbosity >= Verbosity::Info {
            writeln!(self.out, "i {}", message)?;
        }
        Ok(())
    }

    pub fn warning(&mut self, message: &str) -> io::Result<()> {
        self.counts.warnings += 1;
        if self.verbosity >= Verbosity::Warnings {
            writeln!(self.out, "w {}", message)?;
        }
        Ok(())
    }

    pub fn error(&mut self, message: &str) -> io::Result<()> {
        self.counts.errors += 1;
        writeln!(self.err, "e {}", message)?;
        if self.verbosity >= Verbosity::Warnings {
            writeln!(self.out, "e {}", message)?;
        }
        Ok(())
    }

    /// Flushes both channels.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()?;
        self.err.flush()
    }
}
