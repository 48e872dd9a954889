//! Head-to-head records between club players
//!
//! Games, pair summaries, the per-pair loader and the roster-wide aggregator.

pub mod aggregate;
pub mod game;
pub mod loader;
pub mod summary;

pub use aggregate::{Aggregation, PersistenceSink, RosterAggregator};
pub use game::{Color, Game, GameResult, GameRow};
pub use loader::{HeadToHead, HeadToHeadLoader};
pub use summary::{PairKey, PairSummary};
