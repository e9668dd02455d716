//! Reported conditions
//!
//! The encoder never aborts on recoverable problems. It records them here
//! with a severity, mirrors them to `tracing`, and carries on.

use std::collections::HashSet;
use std::fmt;

/// How serious a reported condition is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// A single reported condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// Conditions collected during one export run
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    once: HashSet<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a condition
    pub fn report(&mut self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Error => tracing::error!("{message}"),
            Severity::Warning => tracing::warn!("{message}"),
            Severity::Info => tracing::info!("{message}"),
        }
        self.entries.push(Diagnostic { severity, message });
    }

    /// Record a condition only the first time `key` is seen
    ///
    /// Returns `true` if it was recorded.
    pub fn report_once(
        &mut self,
        key: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> bool {
        if !self.once.insert(key.into()) {
            return false;
        }
        self.report(severity, message);
        true
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.report(Severity::Error, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.report(Severity::Warning, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.report(Severity::Info, message);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of conditions with the given severity
    pub fn count(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|d| d.severity == severity).count()
    }

    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    /// True if any recorded message contains `needle`
    pub fn mentions(&self, needle: &str) -> bool {
        self.entries.iter().any(|d| d.message.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_once() {
        let mut diagnostics = Diagnostics::new();
        assert!(diagnostics.report_once("uv", Severity::Error, "UVs out of range"));
        assert!(!diagnostics.report_once("uv", Severity::Error, "UVs out of range"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn test_count_by_severity() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.warning("no armature");
        diagnostics.info("done");
        diagnostics.info("size");
        assert_eq!(diagnostics.count(Severity::Info), 2);
        assert_eq!(diagnostics.count(Severity::Warning), 1);
        assert!(!diagnostics.has_errors());
        assert!(diagnostics.mentions("armature"));
    }
}
