//! SQLite storage for clubs, players, games and pair summaries

use crate::club::Club;
use crate::head_to_head::{Color, Game, GameResult, PairKey, PairSummary, PersistenceSink};
use crate::{Player, PlayerId, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS clubs (
                id          TEXT NOT NULL PRIMARY KEY,
                name        TEXT,
                url         TEXT,
                roster_url  TEXT
            );

            CREATE TABLE IF NOT EXISTS players (
                id          TEXT NOT NULL PRIMARY KEY,
                name        TEXT,
                state       TEXT,
                date        TEXT,       -- date of rating
                rating      INTEGER,
                event_count INTEGER,
                last_event  TEXT
            );

            CREATE TABLE IF NOT EXISTS games (
                pid         TEXT NOT NULL,
                pname       TEXT,
                oid         TEXT NOT NULL,
                oname       TEXT,
                tid         TEXT NOT NULL,
                tname       TEXT,
                tdate       TEXT,
                sname       TEXT NOT NULL,
                rnumber     INTEGER NOT NULL,
                color       TEXT,       -- W, B or U
                result      TEXT,       -- W, L, D or as given
                PRIMARY KEY (pid, oid, tid, sname, rnumber)
            );

            CREATE TABLE IF NOT EXISTS summaries (
                pid         TEXT NOT NULL,
                oid         TEXT NOT NULL,
                wins        INTEGER NOT NULL,
                losses      INTEGER NOT NULL,
                draws       INTEGER NOT NULL,
                games       INTEGER NOT NULL,
                pct         REAL NOT NULL,
                PRIMARY KEY (pid, oid)
            );

            CREATE INDEX IF NOT EXISTS idx_games_pair ON games(pid, oid);
            "#,
        )?;
        Ok(())
    }

    // ==================== Club Operations ====================

    /// Add the club if not already present
    pub fn add_club(&self, club: &Club) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO clubs (id, name, url, roster_url) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO NOTHING",
            params![club.id, club.name, club.url, club.active_players_url],
        )?;
        Ok(inserted > 0)
    }

    pub fn get_club(&self) -> Result<Option<Club>> {
        let club = self
            .conn
            .query_row(
                "SELECT id, name, url, roster_url FROM clubs LIMIT 1",
                [],
                |row| {
                    Ok(Club {
                        id: row.get(0)?,
                        name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        url: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        active_players_url: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(club)
    }

    // ==================== Player Operations ====================

    /// Add a player if not already present
    pub fn add_player(&self, player: &Player) -> Result<bool> {
        let inserted = self.conn.execute(
            r#"
            INSERT INTO players (id, name, state, date, rating, event_count, last_event)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO NOTHING
            "#,
            params![
                player.id.as_str(),
                player.name,
                player.state,
                player.rating_date.map(|d| d.format("%Y-%m-%d").to_string()),
                player.rating,
                player.event_count,
                player.last_event,
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Add multiple players, returning how many were new
    pub fn add_players(&self, players: &[Player]) -> Result<usize> {
        let mut count = 0;
        for player in players {
            if self.add_player(player)? {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn get_players(&self) -> Result<Vec<Player>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, state, date, rating, event_count, last_event
             FROM players ORDER BY rowid",
        )?;

        let players = stmt
            .query_map([], |row| {
                let date: Option<String> = row.get(3)?;
                Ok(Player {
                    id: PlayerId(row.get(0)?),
                    name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    state: row.get(2)?,
                    rating_date: date.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
                    rating: row.get(4)?,
                    event_count: row.get(5)?,
                    last_event: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(players)
    }

    // ==================== Game Operations ====================

    /// Store a game unless the same player, opponent, event, section and
    /// round is already stored
    pub fn add_game(&self, game: &Game) -> Result<bool> {
        let inserted = self.conn.execute(
            r#"
            INSERT INTO games (pid, pname, oid, oname, tid, tname, tdate, sname, rnumber, color, result)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(pid, oid, tid, sname, rnumber) DO NOTHING
            "#,
            params![
                game.player_id.as_str(),
                game.player_name,
                game.opponent_id.as_str(),
                game.opponent_name,
                game.tournament_id,
                game.tournament_name,
                game.tournament_date.format("%Y-%m-%d").to_string(),
                game.section,
                game.round,
                game.color.code(),
                game.result.code(),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Games between two players, from `player`'s side, oldest first
    pub fn get_games_between(&self, player: &PlayerId, opponent: &PlayerId) -> Result<Vec<Game>> {
        let mut stmt = self.conn.prepare(
            "SELECT pid, pname, oid, oname, tid, tname, tdate, sname, rnumber, color, result
             FROM games
             WHERE pid = ?1 AND oid = ?2
             ORDER BY tdate, tid, rnumber",
        )?;

        let games = stmt
            .query_map(params![player.as_str(), opponent.as_str()], Self::row_to_game)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(games)
    }

    fn row_to_game(row: &rusqlite::Row) -> rusqlite::Result<Game> {
        let date_str: String = row.get(6)?;
        let tournament_date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let color: String = row.get(9)?;
        let result: String = row.get(10)?;

        Ok(Game {
            player_id: PlayerId(row.get(0)?),
            player_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            opponent_id: PlayerId(row.get(2)?),
            opponent_name: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            tournament_id: row.get(4)?,
            tournament_name: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            tournament_date,
            section: row.get(7)?,
            round: row.get(8)?,
            color: Color::parse(&color),
            result: GameResult::parse(&result),
        })
    }

    // ==================== Summary Operations ====================

    /// Store a summary, replacing the stored one for the same ordered pair
    /// only when the counts differ
    pub fn add_summary(&self, summary: &PairSummary) -> Result<bool> {
        let changed = self.conn.execute(
            r#"
            INSERT INTO summaries (pid, oid, wins, losses, draws, games, pct)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(pid, oid) DO UPDATE SET
                wins = excluded.wins,
                losses = excluded.losses,
                draws = excluded.draws,
                games = excluded.games,
                pct = excluded.pct
            WHERE wins <> excluded.wins
               OR losses <> excluded.losses
               OR draws <> excluded.draws
            "#,
            params![
                summary.player_id().as_str(),
                summary.opponent_id().as_str(),
                summary.wins(),
                summary.losses(),
                summary.draws(),
                summary.games(),
                summary.pct(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn get_summary(&self, key: &PairKey) -> Result<Option<PairSummary>> {
        let summary = self
            .conn
            .query_row(
                "SELECT pid, oid, wins, losses, draws FROM summaries WHERE pid = ?1 AND oid = ?2",
                params![key.player.as_str(), key.opponent.as_str()],
                Self::row_to_summary,
            )
            .optional()?;
        Ok(summary)
    }

    pub fn get_summaries(&self) -> Result<Vec<PairSummary>> {
        let mut stmt = self
            .conn
            .prepare("SELECT pid, oid, wins, losses, draws FROM summaries ORDER BY pid, oid")?;

        let summaries = stmt
            .query_map([], Self::row_to_summary)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(summaries)
    }

    /// `pct` is recomputed from the counts, not read back
    fn row_to_summary(row: &rusqlite::Row) -> rusqlite::Result<PairSummary> {
        let key = PairKey::new(PlayerId(row.get(0)?), PlayerId(row.get(1)?));
        Ok(PairSummary::from_counts(key, row.get(2)?, row.get(3)?, row.get(4)?))
    }

    /// Summaries whose mirrored pair is missing or does not match
    pub fn check_inversions(&self) -> Result<Vec<PairKey>> {
        let summaries = self.get_summaries()?;
        let mut bad = Vec::new();
        for summary in &summaries {
            match self.get_summary(&summary.key().inverse())? {
                Some(inverse) if inverse.is_inverse_of(summary) => {}
                _ => bad.push(summary.key().clone()),
            }
        }
        Ok(bad)
    }

    // ==================== Statistics ====================

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n as usize)
        };

        let min_date: Option<String> = self
            .conn
            .query_row("SELECT MIN(tdate) FROM games", [], |row| row.get(0))
            .optional()?
            .flatten();

        let max_date: Option<String> = self
            .conn
            .query_row("SELECT MAX(tdate) FROM games", [], |row| row.get(0))
            .optional()?
            .flatten();

        Ok(DatabaseStats {
            club_count: count("clubs")?,
            player_count: count("players")?,
            game_count: count("games")?,
            summary_count: count("summaries")?,
            earliest_game: min_date.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            latest_game: max_date.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        })
    }
}

impl PersistenceSink for Database {
    fn write_game(&mut self, game: &Game) -> Result<bool> {
        self.add_game(game)
    }

    fn write_summary(&mut self, summary: &PairSummary) -> Result<bool> {
        self.add_summary(summary)
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub club_count: usize,
    pub player_count: usize,
    pub game_count: usize,
    pub summary_count: usize,
    pub earliest_game: Option<NaiveDate>,
    pub latest_game: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game() -> Game {
        Game {
            player_id: PlayerId::from("12910923"),
            player_name: "JOHN DOE".to_string(),
            opponent_id: PlayerId::from("32197553"),
            opponent_name: "GRAHAM RF NAPIER".to_string(),
            tournament_name: "ADULT AND YOUTH BEFORE CHRISTMAS24".to_string(),
            tournament_id: "202412219692".to_string(),
            tournament_date: NaiveDate::from_ymd_opt(2024, 12, 21).unwrap(),
            section: "ADULTS ONLY WEDNESDAY".to_string(),
            round: 1,
            color: Color::Black,
            result: GameResult::Win,
        }
    }

    fn key() -> PairKey {
        PairKey::new(PlayerId::from("12910923"), PlayerId::from("32197553"))
    }

    #[test]
    fn test_create_database() {
        let db = Database::in_memory().unwrap();
        let stats = db.get_stats().unwrap();
        assert_eq!(stats.club_count, 0);
        assert_eq!(stats.player_count, 0);
        assert_eq!(stats.game_count, 0);
        assert_eq!(stats.summary_count, 0);
    }

    #[test]
    fn test_add_club() {
        let db = Database::in_memory().unwrap();
        let club = Club {
            id: "A6021250".to_string(),
            name: "TEST CHESS CLUB".to_string(),
            url: "https://www.uschess.org/msa/AffDtlMain.php?A6021250".to_string(),
            active_players_url: "https://www.uschess.org/msa/AffPlrList.php?A6021250&min=5&Search=Submit"
                .to_string(),
        };
        assert!(db.add_club(&club).unwrap());
        assert!(!db.add_club(&club).unwrap());
        assert_eq!(db.get_club().unwrap(), Some(club));
    }

    #[test]
    fn test_add_players() {
        let db = Database::in_memory().unwrap();
        let mut alice = Player::new("11111111", "ALICE");
        alice.rating = Some(1800);
        alice.rating_date = NaiveDate::from_ymd_opt(2025, 3, 1);
        let players = vec![alice, Player::new("22222222", "BOB")];

        assert_eq!(db.add_players(&players).unwrap(), 2);
        assert_eq!(db.add_players(&players).unwrap(), 0);
        assert_eq!(db.get_players().unwrap(), players);
    }

    #[test]
    fn test_game_writes_are_idempotent() {
        let mut db = Database::in_memory().unwrap();
        let game = game();

        assert!(db.write_game(&game).unwrap());
        assert!(!db.write_game(&game).unwrap());
        assert!(db.write_game(&game.invert()).unwrap());

        let mut next_round = game.clone();
        next_round.round = 2;
        assert!(db.write_game(&next_round).unwrap());

        assert_eq!(db.get_stats().unwrap().game_count, 3);
    }

    #[test]
    fn test_games_between() {
        let db = Database::in_memory().unwrap();
        let game = game();
        db.add_game(&game).unwrap();
        db.add_game(&game.invert()).unwrap();

        let stored = db
            .get_games_between(&game.player_id, &game.opponent_id)
            .unwrap();
        assert_eq!(stored, vec![game.clone()]);

        let mirrored = db
            .get_games_between(&game.opponent_id, &game.player_id)
            .unwrap();
        assert_eq!(mirrored, vec![game.invert()]);
    }

    #[test]
    fn test_summary_writes_are_idempotent() {
        let mut db = Database::in_memory().unwrap();
        let summary = PairSummary::from_counts(key(), 3, 1, 2);

        assert!(db.write_summary(&summary).unwrap());
        assert!(!db.write_summary(&summary).unwrap());
        assert_eq!(db.get_stats().unwrap().summary_count, 1);

        let stored = db.get_summary(&key()).unwrap().unwrap();
        assert_eq!(stored, summary);
    }

    #[test]
    fn test_changed_summary_replaces_stored_one() {
        let mut db = Database::in_memory().unwrap();
        assert!(db.write_summary(&PairSummary::from_counts(key(), 3, 1, 2)).unwrap());

        // A later run picked up one more win
        let updated = PairSummary::from_counts(key(), 4, 1, 2);
        assert!(db.write_summary(&updated).unwrap());
        assert!(!db.write_summary(&updated).unwrap());

        assert_eq!(db.get_summary(&key()).unwrap(), Some(updated));
        assert_eq!(db.get_stats().unwrap().summary_count, 1);
    }

    #[test]
    fn test_check_inversions() {
        let db = Database::in_memory().unwrap();
        let summary = PairSummary::from_counts(key(), 3, 1, 2);
        db.add_summary(&summary).unwrap();
        assert_eq!(db.check_inversions().unwrap(), vec![key()]);

        db.add_summary(&summary.invert()).unwrap();
        assert!(db.check_inversions().unwrap().is_empty());
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clubs").join("A6021250.db");

        {
            let db = Database::open(&path).unwrap();
            db.add_game(&game()).unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_stats().unwrap().game_count, 1);
    }
}
