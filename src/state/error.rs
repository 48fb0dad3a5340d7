use super::event::SessionEvent;
use super::model::SessionPhase;
use thiserror::Error;

pub type StateResult<T> = std::result::Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid session transition: from {from:?} using event {event:?}")]
    InvalidTransition {
        from: SessionPhase,
        event: SessionEvent,
    },
}
