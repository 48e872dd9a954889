//! Loads the shared game history of two players

use super::game::Game;
use super::summary::{PairKey, PairSummary};
use crate::data::scrapers::uschess::{extract_head_to_head, head_to_head_url};
use crate::data::scrapers::PageFetcher;
use crate::{ChessError, Player, PlayerId, Result};
use serde::Serialize;

/// Loaded head-to-head record of one player against another.
///
/// Only `HeadToHeadLoader::load` and `invert` produce one, so the games and
/// summary always agree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadToHead {
    key: PairKey,
    player_name: Option<String>,
    games: Vec<Game>,
    summary: PairSummary,
}

impl HeadToHead {
    fn from_games(key: PairKey, player_name: Option<String>, games: Vec<Game>) -> Self {
        let summary = PairSummary::from_games(key.clone(), &games);
        HeadToHead {
            key,
            player_name,
            games,
            summary,
        }
    }

    pub fn key(&self) -> &PairKey {
        &self.key
    }

    pub fn player_name(&self) -> Option<&str> {
        self.player_name.as_deref()
    }

    pub fn games(&self) -> &[Game] {
        &self.games
    }

    pub fn summary(&self) -> &PairSummary {
        &self.summary
    }

    /// True if the two players have never met
    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// The same history from the opponent's side, without another fetch
    pub fn invert(&self) -> HeadToHead {
        let games: Vec<Game> = self.games.iter().map(Game::invert).collect();
        let player_name = games.first().map(|g| g.player_name.clone());
        HeadToHead {
            key: self.key.inverse(),
            player_name,
            games,
            summary: self.summary.invert(),
        }
    }
}

pub struct HeadToHeadLoader<F> {
    fetcher: F,
}

impl<F: PageFetcher> HeadToHeadLoader<F> {
    pub fn new(fetcher: F) -> Self {
        HeadToHeadLoader { fetcher }
    }

    /// Fetch and parse `player_id`'s games against `opponent_id`.
    ///
    /// A page without a results table is an empty history. A row that
    /// cannot be parsed, or that names another opponent, fails the whole load.
    pub fn load(&self, player_id: &PlayerId, opponent_id: &PlayerId) -> Result<HeadToHead> {
        self.load_with_name(player_id, opponent_id, None)
    }

    /// Like `load`, falling back to the roster name when the page has none
    pub fn load_player(&self, player: &Player, opponent_id: &PlayerId) -> Result<HeadToHead> {
        self.load_with_name(&player.id, opponent_id, Some(player.name.as_str()))
    }

    fn load_with_name(
        &self,
        player_id: &PlayerId,
        opponent_id: &PlayerId,
        fallback_name: Option<&str>,
    ) -> Result<HeadToHead> {
        let key = PairKey::new(player_id.clone(), opponent_id.clone());
        let url = head_to_head_url(player_id, opponent_id);
        let html = self.fetcher.fetch(&url)?;

        let Some(page) = extract_head_to_head(&html)? else {
            log::debug!("No games between {} and {}", player_id, opponent_id);
            return Ok(HeadToHead::from_games(key, None, Vec::new()));
        };

        let player_name = page
            .player_name
            .filter(|name| !name.is_empty())
            .or_else(|| {
                fallback_name
                    .filter(|name| !name.is_empty())
                    .map(String::from)
            });
        if player_name.is_none() {
            log::debug!("No player name for {}", player_id);
        }
        let name = player_name.as_deref().unwrap_or_default();

        let games = page
            .rows
            .iter()
            .map(|row| {
                let game = Game::from_row(row, player_id, name)?;
                if game.opponent_id != *opponent_id {
                    return Err(ChessError::InvalidGame(format!(
                        "row against {} on the page for {} vs {}",
                        game.opponent_id, player_id, opponent_id
                    )));
                }
                Ok(game)
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "Loaded {} games between {} and {}",
            games.len(),
            player_id,
            opponent_id
        );
        Ok(HeadToHead::from_games(key, player_name, games))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::head_to_head::game::{Color, GameResult};
    use std::collections::HashMap;

    struct FakeFetcher {
        pages: HashMap<String, String>,
    }

    impl PageFetcher for FakeFetcher {
        fn fetch(&self, url: &str) -> Result<String> {
            self.pages.get(url).cloned().ok_or(ChessError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
        }
    }

    fn row(tid: &str, round: u32, color: &str, opp: &str, result: &str) -> String {
        format!(
            r#"<tr><td><a href="http://msa.uschess.org/XtblMain.php?{tid}">CLUB CHAMPIONSHIP</a></td>
            <td>OPEN</td><td>{round}</td><td>{color}</td><td>{opp}</td><td>JANE SMITH</td>
            <td>1500 =&gt; 1510 (R)</td><td>{result}</td></tr>"#
        )
    }

    fn page(rows: &[String]) -> String {
        format!(
            r#"<html><body>
            <table><tr><td>Name</td><td>JOHN DOE</td></tr></table>
            <table><tr><th>Event Name</th><th>Section</th><th>Rnd</th><th>Clr</th>
            <th>Opp ID</th><th>Opponent</th><th>Rating</th><th>Res</th></tr>
            {}
            <tr><td>Search for other opponents</td></tr></table>
            </body></html>"#,
            rows.join("\n")
        )
    }

    fn loader_for(pid: &str, oid: &str, html: String) -> HeadToHeadLoader<FakeFetcher> {
        let url = head_to_head_url(&PlayerId::from(pid), &PlayerId::from(oid));
        HeadToHeadLoader::new(FakeFetcher {
            pages: HashMap::from([(url, html)]),
        })
    }

    #[test]
    fn test_load_games_and_summary() {
        let html = page(&[
            row("202401039692", 1, "W", "22222222", "W"),
            row("202402079692", 2, "B", "22222222", "L"),
            row("202403069692", 3, "", "22222222", "D"),
        ]);
        let loader = loader_for("11111111", "22222222", html);

        let h2h = loader
            .load(&PlayerId::from("11111111"), &PlayerId::from("22222222"))
            .unwrap();

        assert_eq!(h2h.player_name(), Some("JOHN DOE"));
        assert_eq!(h2h.games().len(), 3);
        assert!(h2h.games().iter().all(|g| g.player_name == "JOHN DOE"));
        assert!(h2h.games().iter().all(|g| g.player_id.as_str() == "11111111"));
        assert_eq!(h2h.games()[2].color, Color::Unknown);

        let summary = h2h.summary();
        assert_eq!((summary.wins(), summary.losses(), summary.draws()), (1, 1, 1));
        assert_eq!(summary.pct(), 50.0);
    }

    #[test]
    fn test_load_without_results_table() {
        let loader = loader_for(
            "11111111",
            "22222222",
            "<html><body>No games</body></html>".to_string(),
        );
        let h2h = loader
            .load(&PlayerId::from("11111111"), &PlayerId::from("22222222"))
            .unwrap();

        assert!(h2h.is_empty());
        assert_eq!(h2h.summary().wins(), 0);
        assert_eq!(h2h.summary().losses(), 0);
        assert_eq!(h2h.summary().draws(), 0);
        assert_eq!(h2h.summary().pct(), 0.0);
    }

    #[test]
    fn test_malformed_row_fails_the_load() {
        let html = page(&[
            row("202401039692", 1, "W", "22222222", "W"),
            row("NOTADATE", 2, "B", "22222222", "L"),
        ]);
        let loader = loader_for("11111111", "22222222", html);

        let err = loader
            .load(&PlayerId::from("11111111"), &PlayerId::from("22222222"))
            .unwrap_err();
        assert!(matches!(err, ChessError::InvalidGame(_)));
    }

    #[test]
    fn test_fetch_errors_propagate() {
        let loader = loader_for("11111111", "22222222", String::new());
        let err = loader
            .load(&PlayerId::from("33333333"), &PlayerId::from("22222222"))
            .unwrap_err();
        assert!(matches!(err, ChessError::HttpStatus { status: 404, .. }));
    }

    #[test]
    fn test_invert_head_to_head() {
        let html = page(&[
            row("202401039692", 1, "W", "22222222", "W"),
            row("202402079692", 2, "B", "22222222", "W"),
        ]);
        let loader = loader_for("11111111", "22222222", html);
        let h2h = loader
            .load(&PlayerId::from("11111111"), &PlayerId::from("22222222"))
            .unwrap();

        let inverted = h2h.invert();
        assert_eq!(inverted.key(), &h2h.key().inverse());
        assert_eq!(inverted.player_name(), Some("JANE SMITH"));
        assert!(inverted.games().iter().all(|g| g.result == GameResult::Loss));
        assert_eq!(inverted.summary().losses(), 2);
        assert!(inverted.summary().is_inverse_of(h2h.summary()));
        assert_eq!(inverted.invert(), h2h);
    }

    #[test]
    fn test_row_against_another_opponent_fails_the_load() {
        let html = page(&[
            row("202401039692", 1, "W", "22222222", "W"),
            row("202402079692", 2, "B", "99999999", "W"),
        ]);
        let loader = loader_for("11111111", "22222222", html);

        let err = loader
            .load(&PlayerId::from("11111111"), &PlayerId::from("22222222"))
            .unwrap_err();
        assert!(matches!(err, ChessError::InvalidGame(_)));
    }

    #[test]
    fn test_roster_name_used_when_page_has_none() {
        let html = page(&[row("202401039692", 1, "W", "22222222", "W")])
            .replace("<td>Name</td><td>JOHN DOE</td>", "<td>Member</td><td></td>");
        let loader = loader_for("11111111", "22222222", html);
        let player = Player::new("11111111", "JOHN DOE");

        let h2h = loader
            .load_player(&player, &PlayerId::from("22222222"))
            .unwrap();
        assert_eq!(h2h.player_name(), Some("JOHN DOE"));
        assert_eq!(h2h.games()[0].player_name, "JOHN DOE");
        assert_eq!(h2h.invert().games()[0].opponent_name, "JOHN DOE");

        let anonymous = loader
            .load(&PlayerId::from("11111111"), &PlayerId::from("22222222"))
            .unwrap();
        assert_eq!(anonymous.player_name(), None);
        assert_eq!(anonymous.games()[0].player_name, "");
    }

    #[test]
    fn test_page_name_wins_over_roster_name() {
        let html = page(&[row("202401039692", 1, "W", "22222222", "W")]);
        let loader = loader_for("11111111", "22222222", html);
        let player = Player::new("11111111", "DOE, JOHN");

        let h2h = loader
            .load_player(&player, &PlayerId::from("22222222"))
            .unwrap();
        assert_eq!(h2h.player_name(), Some("JOHN DOE"));
    }
}
