//! Win/loss/draw summary for an ordered pair of players

use super::game::{Game, GameResult};
use crate::PlayerId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered pair of players: results are from `player`'s side
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub player: PlayerId,
    pub opponent: PlayerId,
}

impl PairKey {
    pub fn new(player: PlayerId, opponent: PlayerId) -> Self {
        PairKey { player, opponent }
    }

    pub fn inverse(&self) -> PairKey {
        PairKey {
            player: self.opponent.clone(),
            opponent: self.player.clone(),
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vs {}", self.player, self.opponent)
    }
}

/// Lifetime score of one player against another.
///
/// Immutable: `games` and `pct` are derived from the counts when the value
/// is built, so they can never disagree with them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairSummary {
    key: PairKey,
    wins: u32,
    losses: u32,
    draws: u32,
    pct: f64,
}

impl PairSummary {
    pub fn from_counts(key: PairKey, wins: u32, losses: u32, draws: u32) -> Self {
        let games = wins + losses + draws;
        let pct = if games > 0 {
            100.0 * (wins as f64 + 0.5 * draws as f64) / games as f64
        } else {
            0.0
        };
        PairSummary {
            key,
            wins,
            losses,
            draws,
            pct,
        }
    }

    /// Summary for a pair that has never played
    pub fn empty(key: PairKey) -> Self {
        Self::from_counts(key, 0, 0, 0)
    }

    pub fn from_games(key: PairKey, games: &[Game]) -> Self {
        games
            .iter()
            .fold(Self::empty(key), |summary, game| summary.update_with(game))
    }

    /// Count one more game. Results other than W/L/D leave the counts alone.
    pub fn update_with(self, game: &Game) -> Self {
        let (wins, losses, draws) = (self.wins, self.losses, self.draws);
        match game.result {
            GameResult::Win => Self::from_counts(self.key, wins + 1, losses, draws),
            GameResult::Loss => Self::from_counts(self.key, wins, losses + 1, draws),
            GameResult::Draw => Self::from_counts(self.key, wins, losses, draws + 1),
            GameResult::Other(_) => self,
        }
    }

    /// The same record from the opponent's side
    pub fn invert(&self) -> Self {
        Self::from_counts(self.key.inverse(), self.losses, self.wins, self.draws)
    }

    pub fn key(&self) -> &PairKey {
        &self.key
    }

    pub fn player_id(&self) -> &PlayerId {
        &self.key.player
    }

    pub fn opponent_id(&self) -> &PlayerId {
        &self.key.opponent
    }

    pub fn wins(&self) -> u32 {
        self.wins
    }

    pub fn losses(&self) -> u32 {
        self.losses
    }

    pub fn draws(&self) -> u32 {
        self.draws
    }

    pub fn games(&self) -> u32 {
        self.wins + self.losses + self.draws
    }

    /// Score percentage, 0 to 100
    pub fn pct(&self) -> f64 {
        self.pct
    }

    pub fn is_empty(&self) -> bool {
        self.games() == 0
    }

    /// True if `other` is this summary seen from the other side
    pub fn is_inverse_of(&self, other: &PairSummary) -> bool {
        self.key == other.key.inverse()
            && self.wins == other.losses
            && self.losses == other.wins
            && self.draws == other.draws
    }
}

impl<'de> Deserialize<'de> for PairSummary {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Counts {
            key: PairKey,
            wins: u32,
            losses: u32,
            draws: u32,
        }

        let c = Counts::deserialize(deserializer)?;
        Ok(PairSummary::from_counts(c.key, c.wins, c.losses, c.draws))
    }
}

impl fmt::Display for PairSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} games, +{} -{} ={} ({:.2}%)",
            self.key,
            self.games(),
            self.wins,
            self.losses,
            self.draws,
            self.pct
        )
    }
}
