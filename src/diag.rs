//! Capped in-memory diagnostic log.
//!
//! Long imports and classification runs accumulate per-file and per-artist
//! failures that should not abort the run but should be inspectable
//! afterwards. The log keeps the most recent entries only.

use serde::Serialize;

/// Maximum retained entries; older ones are dropped first.
const MAX_ENTRIES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEntry {
    pub severity: Severity,
    /// Subsystem the entry came from ("import", "classify", ...).
    pub context: String,
    pub message: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

#[derive(Debug, Default)]
pub struct DiagnosticLog {
    entries: Vec<DiagnosticEntry>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, context: &str, message: &str) {
        self.push(Severity::Info, context, message);
    }

    pub fn warn(&mut self, context: &str, message: &str) {
        self.push(Severity::Warn, context, message);
    }

    pub fn error(&mut self, context: &str, message: &str) {
        self.push(Severity::Error, context, message);
    }

    fn push(&mut self, severity: Severity, context: &str, message: &str) {
        self.entries.push(DiagnosticEntry {
            severity,
            context: context.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
        if self.entries.len() > MAX_ENTRIES {
            let overflow = self.entries.len() - MAX_ENTRIES;
            self.entries.drain(..overflow);
        }
    }

    pub fn entries(&self) -> &[DiagnosticEntry] {
        &self.entries
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.severity == Severity::Error)
            .count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Dump the log as pretty JSON for bug reports.
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_most_recent_entries() {
        let mut diag = DiagnosticLog::new();
        for i in 0..150 {
            diag.error("test", &format!("failure {i}"));
        }
        assert_eq!(diag.entries().len(), 100);
        assert_eq!(diag.entries()[0].message, "failure 50");
        assert_eq!(diag.entries()[99].message, "failure 149");
    }

    #[test]
    fn counts_errors_only() {
        let mut diag = DiagnosticLog::new();
        diag.info("test", "fyi");
        diag.warn("test", "hmm");
        diag.error("test", "boom");
        assert_eq!(diag.error_count(), 1);
        assert_eq!(diag.entries().len(), 3);
    }

    #[test]
    fn export_is_valid_json() {
        let mut diag = DiagnosticLog::new();
        diag.error("import", "file.json: bad");
        let json = diag.export_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
        assert_eq!(parsed[0]["severity"], "error");
    }
}
