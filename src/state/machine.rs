use super::error::{StateError, StateResult};
use super::event::PhaseTransition;
use super::{SessionEvent, SessionPhase};

#[derive(Debug)]
pub struct SessionMachine {
    phase: SessionPhase,
    transition_history: Vec<PhaseTransition>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::default(),
            transition_history: Vec::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn can_transition(&self, event: SessionEvent) -> bool {
        self.next_phase(event).is_some()
    }

    pub fn next_phase(&self, event: SessionEvent) -> Option<SessionPhase> {
        use SessionEvent::*;
        match (self.phase, event) {
            (SessionPhase::Idle, Begin) => Some(SessionPhase::Active),
            (SessionPhase::Active, StartScan) => Some(SessionPhase::Scanning),
            (SessionPhase::Scanning, StopScan) => Some(SessionPhase::Active),
            _ => None,
        }
    }

    pub fn transition(&mut self, event: SessionEvent) -> StateResult<SessionPhase> {
        tracing::debug!(from = ?self.phase, event = ?event, "request session transition");
        let next = self.next_phase(event).ok_or_else(|| {
            let from = self.phase;
            tracing::warn!(from = ?from, event = ?event, "invalid session transition requested");
            StateError::InvalidTransition { from, event }
        })?;

        self.transition_history
            .push(PhaseTransition::new(self.phase, event, next));
        self.phase = next;

        Ok(self.phase)
    }
}

#[cfg(test)]
impl SessionMachine {
    fn history(&self) -> &[PhaseTransition] {
        &self.transition_history
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionPhase::{:?}", self.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanning_requires_an_active_session() {
        let mut machine = SessionMachine::new();
        assert!(machine.can_transition(SessionEvent::Begin));
        assert!(!machine.can_transition(SessionEvent::StartScan));

        machine
            .transition(SessionEvent::Begin)
            .expect("idle -> active should transition");

        assert!(machine.can_transition(SessionEvent::StartScan));
        assert!(!machine.can_transition(SessionEvent::StopScan));
        assert!(!machine.can_transition(SessionEvent::Begin));
        assert!(machine.phase().is_started());
    }

    #[test]
    fn transition_records_history_in_order() {
        let mut machine = SessionMachine::new();
        machine.transition(SessionEvent::Begin).unwrap();
        machine.transition(SessionEvent::StartScan).unwrap();
        machine.transition(SessionEvent::StopScan).unwrap();

        assert_eq!(machine.phase(), SessionPhase::Active);
        assert_eq!(
            machine.history(),
            &[
                PhaseTransition::new(
                    SessionPhase::Idle,
                    SessionEvent::Begin,
                    SessionPhase::Active
                ),
                PhaseTransition::new(
                    SessionPhase::Active,
                    SessionEvent::StartScan,
                    SessionPhase::Scanning
                ),
                PhaseTransition::new(
                    SessionPhase::Scanning,
                    SessionEvent::StopScan,
                    SessionPhase::Active
                ),
            ]
        );
    }

    #[test]
    fn invalid_transition_returns_error_without_mutating_history() {
        let mut machine = SessionMachine::new();

        let err = machine
            .transition(SessionEvent::StopScan)
            .expect_err("idle -> stop scan should fail");
        assert!(matches!(
            err,
            StateError::InvalidTransition {
                from: SessionPhase::Idle,
                event: SessionEvent::StopScan
            }
        ));
        assert_eq!(machine.phase(), SessionPhase::Idle);
        assert!(machine.history().is_empty());
        assert_eq!(machine.to_string(), "SessionPhase::Idle");
    }
}
