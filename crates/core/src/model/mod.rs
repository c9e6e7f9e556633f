mod card;
mod deck;
mod ids;
mod progress;

pub use ids::{CardId, DeckId, LearnerId, ParseIdError};

pub use card::{Card, CardError};
pub use deck::{Deck, DeckError};
pub use progress::{ProgressSnapshot, SessionMode};
