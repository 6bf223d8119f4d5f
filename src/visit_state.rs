//! Visit state machine (C7, spec.md §4.7): `created -> ongoing ->
//! {full, partial, failed, not_found}`. Terminal statuses are never
//! modified once reached; every `load(origin)` call starts a fresh
//! machine in `created`.

use crate::model::VisitStatus;

/// Wraps a `VisitStatus` and enforces the legal transition graph so an
/// illegal jump (e.g. `Created` straight to `Full`, or leaving a terminal
/// status) is a programmer error caught at the call site rather than a
/// silently-wrong stored status.
#[derive(Debug, Clone, Copy)]
pub struct VisitStateMachine {
    current: VisitStatus,
}

impl VisitStateMachine {
    /// Every visit starts here (spec.md §4.7: "new `load(origin)` always
    /// creates a fresh visit").
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: VisitStatus::Created,
        }
    }

    #[must_use]
    pub fn current(&self) -> VisitStatus {
        self.current
    }

    /// Attempt to move to `next`. Fails if `next` isn't reachable from the
    /// current status, or if the current status is already terminal.
    pub fn transition(&mut self, next: VisitStatus) -> Result<(), String> {
        if self.current.is_terminal() {
            return Err(format!("visit already terminal at {:?}, cannot move to {next:?}", self.current));
        }
        let legal = match self.current {
            VisitStatus::Created => matches!(next, VisitStatus::Ongoing),
            VisitStatus::Ongoing => matches!(
                next,
                VisitStatus::Full | VisitStatus::Partial | VisitStatus::Failed | VisitStatus::NotFound
            ),
            VisitStatus::Full | VisitStatus::Partial | VisitStatus::Failed | VisitStatus::NotFound => false,
        };
        if !legal {
            return Err(format!("illegal visit transition {:?} -> {next:?}", self.current));
        }
        self.current = next;
        Ok(())
    }
}

impl Default for VisitStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_created() {
        assert_eq!(VisitStateMachine::new().current(), VisitStatus::Created);
    }

    #[test]
    fn follows_the_legal_path_to_full() {
        let mut m = VisitStateMachine::new();
        m.transition(VisitStatus::Ongoing).unwrap();
        m.transition(VisitStatus::Full).unwrap();
        assert_eq!(m.current(), VisitStatus::Full);
    }

    #[test]
    fn rejects_skipping_ongoing() {
        let mut m = VisitStateMachine::new();
        assert!(m.transition(VisitStatus::Full).is_err());
    }

    #[test]
    fn rejects_leaving_a_terminal_status() {
        let mut m = VisitStateMachine::new();
        m.transition(VisitStatus::Ongoing).unwrap();
        m.transition(VisitStatus::Failed).unwrap();
        assert!(m.transition(VisitStatus::Full).is_err());
    }
}
