//! USCF affiliate (club) loading

use crate::data::scrapers::uschess::{
    active_players_url, club_url, extract_club, extract_member_name, extract_roster,
    member_lookup_url,
};
use crate::data::scrapers::PageFetcher;
use crate::{ChessError, ClubConfig, Player, PlayerId, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A chess club, identified by its USCF affiliate id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Club {
    pub id: String,
    pub name: String,
    /// Club detail page
    pub url: String,
    /// Active player list, filtered by minimum games played
    pub active_players_url: String,
}

impl Club {
    /// Fetch the club detail page and resolve the active player list link
    pub fn load<F: PageFetcher>(id: &str, fetcher: &F, config: &ClubConfig) -> Result<Club> {
        let url = club_url(id);
        log::info!("Loading club {}", id);

        let html = fetcher.fetch(&url)?;
        let page = extract_club(&html)?;
        let roster_href = resolve(&url, &page.roster_href)?;

        Ok(Club {
            id: id.to_string(),
            name: page.name,
            url,
            active_players_url: active_players_url(&roster_href, config.min_games),
        })
    }

    /// Players on the club's active player list, in page order
    pub fn active_players<F: PageFetcher>(&self, fetcher: &F) -> Result<Vec<Player>> {
        let html = fetcher.fetch(&self.active_players_url)?;
        let players = extract_roster(&html)?;
        log::info!("{} has {} active players", self.name, players.len());
        Ok(players)
    }
}

impl fmt::Display for Club {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.name)
    }
}

/// Look up a member's name from their id
pub fn player_name<F: PageFetcher>(id: &PlayerId, fetcher: &F) -> Result<Option<String>> {
    let html = fetcher.fetch(&member_lookup_url(id))?;
    Ok(extract_member_name(&html))
}

/// Roster links may be relative to the club page
fn resolve(base: &str, href: &str) -> Result<String> {
    Url::parse(base)
        .and_then(|base| base.join(href))
        .map(String::from)
        .map_err(|e| ChessError::malformed("club", format!("bad roster link '{}': {}", href, e)))
}
