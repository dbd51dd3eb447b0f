use std::result;

use serenity::prelude::SerenityError;
use thiserror::Error as ThisError;

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, Clone, Eq, PartialEq, ThisError)]
pub enum Error {
    // Rejected at the command boundary before any state is mutated.
    #[error("{0}")]
    Validation(String),
    // The requested giveaway or fill plan doesn't exist.
    #[error("{0}")]
    NotFound(String),
    // A giveaway is already registered under this message id.
    #[error("{0}")]
    DuplicateKey(String),
    // A reroll was requested but everyone eligible has already won.
    #[error("There are no eligible participants left for the reroll.")]
    NoEligibleParticipants,
    // The giveaway channel or message can't be reached anymore. Terminal
    // for the affected giveaway, never retried.
    #[error("{0}")]
    Unreachable(String),
    #[error("{0}")]
    SerenityError(String),
}

impl From<SerenityError> for Error {
    fn from(err: SerenityError) -> Error {
        let description = err.to_string();
        Error::SerenityError(description)
    }
}
