pub mod error;
pub mod event;
pub mod machine;
pub mod model;

pub use error::{StateError, StateResult};
pub use event::SessionEvent;
pub use machine::SessionMachine;
pub use model::SessionPhase;
