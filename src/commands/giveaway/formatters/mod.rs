pub mod base;
pub mod text;

pub use crate::commands::giveaway::formatters::base::GiveawayFormatter;
pub use crate::commands::giveaway::formatters::text::{DefaultGiveawayFormatter, GIVEAWAY_EMOJI};
