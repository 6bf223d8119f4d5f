//! Retry/failure accounting (C8): classify a `LoaderError` into the scope
//! it should be handled at (spec.md §4.8) and accumulate per-branch
//! failures for a visit without aborting it.

use crate::error::LoaderError;

/// The scope a failure applies to, derived from `LoaderError::is_structural`/
/// `is_transient`. Structural errors are fatal for the branch they occur in;
/// transient errors are only seen here once a component has already
/// exhausted its own retry policy; `Cancelled`/`Timeout` abort the visit
/// (or, for an artifact-scoped timeout, just the branch) outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Structural,
    Transient,
    Cancelled,
    TimedOut,
}

impl FailureKind {
    #[must_use]
    pub fn classify(err: &LoaderError) -> Self {
        match err {
            LoaderError::Cancelled => FailureKind::Cancelled,
            LoaderError::Timeout(_) => FailureKind::TimedOut,
            e if e.is_structural() => FailureKind::Structural,
            _ => FailureKind::Transient,
        }
    }
}

/// One branch that failed to make it into the new snapshot, with enough
/// context to explain why in the visit's logs.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub branch: Vec<u8>,
    pub url: Option<String>,
    pub kind: FailureKind,
    pub message: String,
}

impl FailureRecord {
    #[must_use]
    pub fn new(branch: Vec<u8>, url: Option<String>, err: &LoaderError) -> Self {
        Self {
            branch,
            url,
            kind: FailureKind::classify(err),
            message: err.to_string(),
        }
    }
}

/// Accumulates per-branch failures across a visit. A non-empty ledger
/// after processing every version means the visit is at best `partial`
/// (spec.md §4.6 step 7); an empty ledger with at least one successful
/// branch means `full`.
#[derive(Debug, Default)]
pub struct FailureLedger {
    records: Vec<FailureRecord>,
}

impl FailureLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, branch: Vec<u8>, url: Option<String>, err: &LoaderError) {
        self.records.push(FailureRecord::new(branch, url, err));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[FailureRecord] {
        &self.records
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<FailureRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_structural_and_transient_errors() {
        let not_found = LoaderError::NotFound("x".into());
        let network = LoaderError::Io(std::io::Error::other("boom"));
        assert_eq!(FailureKind::classify(&not_found), FailureKind::Structural);
        assert_eq!(FailureKind::classify(&network), FailureKind::Transient);
        assert_eq!(FailureKind::classify(&LoaderError::Cancelled), FailureKind::Cancelled);
        assert_eq!(
            FailureKind::classify(&LoaderError::Timeout("artifact".into())),
            FailureKind::TimedOut
        );
    }

    #[test]
    fn ledger_accumulates_records() {
        let mut ledger = FailureLedger::new();
        assert!(ledger.is_empty());
        ledger.record(b"releases/1.0".to_vec(), None, &LoaderError::NotFound("x".into()));
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.is_empty());
    }
}
