use super::model::SessionPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Begin,
    StartScan,
    StopScan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: SessionPhase,
    pub event: SessionEvent,
    pub to: SessionPhase,
}

impl PhaseTransition {
    pub const fn new(from: SessionPhase, event: SessionEvent, to: SessionPhase) -> Self {
        Self { from, event, to }
    }
}
