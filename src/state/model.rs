/// Phase of a deck session.
///
/// Decks are only persisted once the session has left `Idle`, and the camera
/// is only held while `Scanning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Active,
    Scanning,
}

impl SessionPhase {
    pub fn is_started(self) -> bool {
        !matches!(self, Self::Idle)
    }
}
