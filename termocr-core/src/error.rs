use thiserror::Error;

use crate::document::WordId;
use crate::stage::StageKind;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid {what}: {value}")]
    InvalidArgument { what: &'static str, value: String },
    #[error("search term is empty")]
    EmptyQuery,
    #[error("no rendered line found for selected word {word}")]
    UnresolvedLineIdentity { word: WordId },
    #[error("{running} is still running")]
    StageInFlight { running: StageKind },
    #[error("no document is loaded")]
    NoDocument,
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
