//! Game records parsed from a head-to-head page
//!
//! A `Game` is always seen from one player's side. `Game::invert` gives the
//! same game from the opponent's side.

use crate::{ChessError, PlayerId, Result};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Color played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    White,
    Black,
    /// Not recorded on the crosstable (common in older events)
    Unknown,
}

impl Color {
    /// Parse a color cell; anything other than `W` or `B` is unknown
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            "W" => Color::White,
            "B" => Color::Black,
            _ => Color::Unknown,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Color::White => "W",
            Color::Black => "B",
            Color::Unknown => "U",
        }
    }

    pub fn invert(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
            Color::Unknown => Color::Unknown,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of a game for the player whose side the record is on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameResult {
    Win,
    Loss,
    Draw,
    /// Any other code the site uses (forfeits, byes, blanks)
    Other(String),
}

impl GameResult {
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            "W" => GameResult::Win,
            "L" => GameResult::Loss,
            "D" => GameResult::Draw,
            other => GameResult::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            GameResult::Win => "W",
            GameResult::Loss => "L",
            GameResult::Draw => "D",
            GameResult::Other(code) => code,
        }
    }

    pub fn invert(&self) -> Self {
        match self {
            GameResult::Win => GameResult::Loss,
            GameResult::Loss => GameResult::Win,
            other => other.clone(),
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Raw cells of one head-to-head table row, in column order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameRow {
    pub event_name: String,
    /// Link to the event crosstable, `...XtblMain.php?<tournament id>`
    pub event_href: Option<String>,
    pub section: String,
    pub round: String,
    pub color: String,
    pub opponent_id: String,
    pub opponent_name: String,
    /// Rating change, e.g. `1074 => 1012 (R)`; not stored
    pub rating: String,
    pub result: String,
}

/// One game between two players in one round of one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub player_id: PlayerId,
    pub player_name: String,
    pub opponent_id: PlayerId,
    pub opponent_name: String,
    pub tournament_name: String,
    pub tournament_id: String,
    pub tournament_date: NaiveDate,
    pub section: String,
    pub round: u32,
    pub color: Color,
    pub result: GameResult,
}

impl Game {
    /// Build a game from a table row of `player`'s head-to-head page.
    ///
    /// Fails on any missing or unparseable structural field. Unknown color
    /// and result codes are kept.
    pub fn from_row(row: &GameRow, player_id: &PlayerId, player_name: &str) -> Result<Game> {
        let tournament_id = tournament_id_from_href(row.event_href.as_deref())?;
        let tournament_date = tournament_date(&tournament_id)?;

        let round_text = row.round.trim();
        let round = round_text
            .parse::<u32>()
            .map_err(|_| ChessError::InvalidGame(format!("bad round number '{}'", round_text)))?;

        let opponent_id = PlayerId::new(row.opponent_id.trim());
        if opponent_id.as_str().is_empty() {
            return Err(ChessError::InvalidGame("missing opponent id".to_string()));
        }
        if &opponent_id == player_id {
            return Err(ChessError::InvalidGame(format!(
                "player {} listed as their own opponent",
                player_id
            )));
        }

        Ok(Game {
            player_id: player_id.clone(),
            player_name: player_name.to_string(),
            opponent_id,
            opponent_name: row.opponent_name.trim().to_string(),
            tournament_name: row.event_name.trim().to_string(),
            tournament_id,
            tournament_date,
            section: row.section.trim().to_string(),
            round,
            color: Color::parse(&row.color),
            result: GameResult::parse(&row.result),
        })
    }

    /// The same game from the opponent's side
    pub fn invert(&self) -> Game {
        Game {
            player_id: self.opponent_id.clone(),
            player_name: self.opponent_name.clone(),
            opponent_id: self.player_id.clone(),
            opponent_name: self.player_name.clone(),
            tournament_name: self.tournament_name.clone(),
            tournament_id: self.tournament_id.clone(),
            tournament_date: self.tournament_date,
            section: self.section.clone(),
            round: self.round,
            color: self.color.invert(),
            result: self.result.invert(),
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} rd {} ({}): {} vs {} [{}] {}",
            self.tournament_date,
            self.tournament_name,
            self.round,
            self.section,
            self.player_name,
            self.opponent_name,
            self.color,
            self.result
        )
    }
}

/// Tournament id is the query string of the crosstable link
fn tournament_id_from_href(href: Option<&str>) -> Result<String> {
    let href = href.ok_or_else(|| ChessError::InvalidGame("event cell has no link".to_string()))?;
    match href.split_once('?') {
        Some((_, query)) if !query.trim().is_empty() => Ok(query.trim().to_string()),
        _ => Err(ChessError::InvalidGame(format!(
            "no tournament id in event link '{}'",
            href
        ))),
    }
}

static DATE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})(\d{2})(\d{2})").unwrap());

/// Tournament ids start with the event's `YYYYMMDD` date
fn tournament_date(tournament_id: &str) -> Result<NaiveDate> {
    let caps = DATE_PREFIX_RE.captures(tournament_id).ok_or_else(|| {
        ChessError::InvalidGame(format!("tournament id '{}' has no date prefix", tournament_id))
    })?;
    let part = |i: usize| caps[i].parse::<u32>().unwrap_or(0);

    NaiveDate::from_ymd_opt(part(1) as i32, part(2), part(3)).ok_or_else(|| {
        ChessError::InvalidGame(format!(
            "tournament id '{}' has an invalid date",
            tournament_id
        ))
    })
}
