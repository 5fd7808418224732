use spdlog::warn;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-record failures. None of these stop the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    FieldCountMismatch,
    TimestampParseError,
    NumericParseError,
    LateDataDropped,
}

impl DiagnosticKind {
    pub const ALL: [DiagnosticKind; 4] = [
        DiagnosticKind::FieldCountMismatch,
        DiagnosticKind::TimestampParseError,
        DiagnosticKind::NumericParseError,
        DiagnosticKind::LateDataDropped,
    ];

    fn index(self) -> usize {
        match self {
            DiagnosticKind::FieldCountMismatch => 0,
            DiagnosticKind::TimestampParseError => 1,
            DiagnosticKind::NumericParseError => 2,
            DiagnosticKind::LateDataDropped => 3,
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::FieldCountMismatch => "FieldCountMismatch",
            DiagnosticKind::TimestampParseError => "TimestampParseError",
            DiagnosticKind::NumericParseError => "NumericParseError",
            DiagnosticKind::LateDataDropped => "LateDataDropped",
        };
        f.write_str(name)
    }
}

/// A dropped record: what went wrong, the offending input, and where.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub input: String,
    pub context: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, input: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            kind,
            input: input.into(),
            context: context.into(),
        }
    }
}

/// Receiver of per-record diagnostics.
///
/// Shared by the parser and every partition worker, hence `Send + Sync`.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Logs each diagnostic as a warning and counts them per kind.
#[derive(Default)]
pub struct LogDiagnostics {
    counts: [AtomicU64; 4],
}

impl LogDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, kind: DiagnosticKind) -> u64 {
        self.counts[kind.index()].load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        DiagnosticKind::ALL.iter().map(|k| self.count(*k)).sum()
    }

    /// One line per kind, e.g. `FieldCountMismatch=3 LateDataDropped=0 ...`.
    pub fn format_counts(&self) -> String {
        DiagnosticKind::ALL
            .iter()
            .map(|k| format!("{}={}", k, self.count(*k)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl DiagnosticSink for LogDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        self.counts[diagnostic.kind.index()].fetch_add(1, Ordering::Relaxed);
        warn!(
            "[{}] {}, input record: {}",
            diagnostic.kind, diagnostic.context, diagnostic.input
        );
    }
}

/// Keeps every diagnostic in memory. Used by tests to assert on dropped records.
#[derive(Default)]
pub struct MemoryDiagnostics {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.lock().clone()
    }

    pub fn kinds(&self) -> Vec<DiagnosticKind> {
        self.lock().iter().map(|d| d.kind).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Diagnostic>> {
        // A panic while holding the lock cannot leave the Vec half-written.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DiagnosticSink for MemoryDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        self.lock().push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_diagnostics_counts_per_kind() {
        let diagnostics = LogDiagnostics::new();
        diagnostics.report(Diagnostic::new(DiagnosticKind::FieldCountMismatch, "a b", "expected 8 fields, found 2"));
        diagnostics.report(Diagnostic::new(DiagnosticKind::FieldCountMismatch, "", "expected 8 fields, found 0"));
        diagnostics.report(Diagnostic::new(DiagnosticKind::LateDataDropped, "x", "late"));

        assert_eq!(diagnostics.count(DiagnosticKind::FieldCountMismatch), 2);
        assert_eq!(diagnostics.count(DiagnosticKind::LateDataDropped), 1);
        assert_eq!(diagnostics.count(DiagnosticKind::NumericParseError), 0);
        assert_eq!(diagnostics.total(), 3);
        assert!(diagnostics.format_counts().contains("FieldCountMismatch=2"));
    }

    #[test]
    fn test_memory_diagnostics_keeps_order() {
        let diagnostics = MemoryDiagnostics::new();
        assert!(diagnostics.is_empty());

        diagnostics.report(Diagnostic::new(DiagnosticKind::NumericParseError, "l1", "c1"));
        diagnostics.report(Diagnostic::new(DiagnosticKind::TimestampParseError, "l2", "c2"));

        assert_eq!(
            diagnostics.kinds(),
            vec![DiagnosticKind::NumericParseError, DiagnosticKind::TimestampParseError]
        );
        assert_eq!(diagnostics.entries()[1].input, "l2");
    }
}
