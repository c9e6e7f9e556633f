use thiserror::Error;

use crate::model::{CardError, DeckError, ParseIdError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Card(#[from] CardError),
    #[error(transparent)]
    Deck(#[from] DeckError),
    #[error(transparent)]
    Id(#[from] ParseIdError),
}
