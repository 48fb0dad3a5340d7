use crate::deck::CardImageError;
use crate::scan::ScanError;
use crate::speech::SpeechError;
use crate::state::StateError;
use crate::storage::StorageError;
use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Speech(#[from] SpeechError),
    #[error(transparent)]
    Image(#[from] CardImageError),
}
