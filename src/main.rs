//! USCF club head-to-head CLI
//!
//! Builds a SQLite database of every head-to-head record between the active
//! players of a chess club.

use chess_clubs::{Config, FailurePolicy, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chess-clubs")]
#[command(about = "Head-to-head records for USCF club players", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the head-to-head database for a club
    Build {
        /// USCF affiliate id, e.g. A6021250
        club_id: String,
        /// Database path (defaults to <database_dir>/<club_id>.db)
        #[arg(short, long)]
        output: Option<String>,
        /// Minimum games with the club for a player to be included
        #[arg(long)]
        min_games: Option<u32>,
        /// Worker threads for loading pairs
        #[arg(long)]
        jobs: Option<usize>,
        /// Leave out pairs that fail to load instead of stopping
        #[arg(long)]
        skip_failures: bool,
        /// Cache directory for HTML pages
        #[arg(long)]
        cache: Option<String>,
        /// Use only cached pages (no network requests)
        #[arg(long)]
        offline: bool,
        /// Delete any existing database first
        #[arg(long)]
        fresh: bool,
    },
    /// Show the record between two players, from both sides
    HeadToHead {
        /// Player member id
        player: String,
        /// Opponent member id
        opponent: String,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Look up a member's name
    Player {
        /// Member id
        id: String,
    },
    /// Show database status
    Status {
        /// USCF affiliate id of a built club
        club_id: String,
        /// Database path (defaults to <database_dir>/<club_id>.db)
        #[arg(short, long)]
        database: Option<String>,
    },
    /// Write a default config file
    Init,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use table or json.", s)),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let mut config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match cli.command {
        Commands::Build {
            club_id,
            output,
            min_games,
            jobs,
            skip_failures,
            cache,
            offline,
            fresh,
        } => {
            if let Some(n) = min_games {
                config.club.min_games = n;
            }
            if let Some(n) = jobs {
                config.aggregate.jobs = n;
            }
            if skip_failures {
                config.aggregate.failure_policy = FailurePolicy::Skip;
            }
            if cache.is_some() {
                config.data.cache_dir = cache;
            }
            commands::build(&config, &club_id, output, offline, fresh)
        }
        Commands::HeadToHead {
            player,
            opponent,
            format,
        } => commands::head_to_head(&config, &player, &opponent, format),
        Commands::Player { id } => commands::player(&config, &id),
        Commands::Status { club_id, database } => commands::status(&config, &club_id, database),
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use chess_clubs::club::{self, Club};
    use chess_clubs::data::scrapers::HttpFetcher;
    use chess_clubs::data::Database;
    use chess_clubs::head_to_head::{HeadToHead, HeadToHeadLoader, RosterAggregator};
    use chess_clubs::{ChessError, PlayerId};
    use std::path::Path;

    fn fetcher(config: &Config, offline: bool) -> Result<HttpFetcher> {
        let mut fetcher = HttpFetcher::new(&config.net)?;
        if let Some(cache_dir) = &config.data.cache_dir {
            println!("Using cache directory: {}", cache_dir);
            fetcher = fetcher.with_cache(cache_dir);
        }
        if offline {
            if config.data.cache_dir.is_none() {
                return Err(ChessError::Config(
                    "--offline needs a cache directory (--cache or data.cache_dir)".to_string(),
                ));
            }
            println!("Offline mode: using cached pages only");
            fetcher = fetcher.offline_only(true);
        }
        Ok(fetcher)
    }

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Run 'chess-clubs build <CLUB_ID>' to build a club database");
        println!("  3. Run 'chess-clubs status <CLUB_ID>' to inspect it");

        Ok(())
    }

    pub fn build(
        config: &Config,
        club_id: &str,
        output: Option<String>,
        offline: bool,
        fresh: bool,
    ) -> Result<()> {
        let db_path = output.unwrap_or_else(|| {
            config
                .data
                .database_path(club_id)
                .to_string_lossy()
                .into_owned()
        });

        if fresh && Path::new(&db_path).exists() {
            println!("Removing existing database {}", db_path);
            std::fs::remove_file(&db_path)?;
        }

        let fetcher = fetcher(config, offline)?;

        let club = Club::load(club_id, &fetcher, &config.club)?;
        println!("Club {}", club);

        let players = club.active_players(&fetcher)?;
        println!(
            "{} active players with at least {} games",
            players.len(),
            config.club.min_games
        );

        let mut db = Database::open(&db_path)?;
        db.add_club(&club)?;
        let new_players = db.add_players(&players)?;
        println!("Stored {} new players", new_players);

        let aggregator = RosterAggregator::new(&fetcher, &config.aggregate);
        let aggregation = aggregator.run(&players, &mut db)?;

        println!("\nBuild Summary");
        println!("───────────────────────────────");
        println!("  Database:  {}", db_path);
        println!("  Players:   {}", players.len());
        println!("  Fetches:   {}", aggregation.fetches);
        println!("  Summaries: {}", aggregation.summaries.len());
        println!("  Games:     {}", aggregation.games_written);
        if !aggregation.skipped.is_empty() {
            println!("  Skipped:   {}", aggregation.skipped.len());
            for (key, reason) in &aggregation.skipped {
                println!("    {}: {}", key, reason);
            }
        }

        Ok(())
    }

    pub fn head_to_head(
        config: &Config,
        player: &str,
        opponent: &str,
        format: OutputFormat,
    ) -> Result<()> {
        let fetcher = fetcher(config, false)?;
        let loader = HeadToHeadLoader::new(&fetcher);

        let forward = loader.load(&PlayerId::from(player), &PlayerId::from(opponent))?;
        let inverse = forward.invert();

        match format {
            OutputFormat::Table => {
                print_head_to_head(&forward);
                println!();
                print_head_to_head(&inverse);
            }
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "forward": forward,
                    "inverse": inverse,
                });
                let text = serde_json::to_string_pretty(&json)
                    .map_err(|e| ChessError::Config(format!("Failed to serialize: {}", e)))?;
                println!("{}", text);
            }
        }

        Ok(())
    }

    fn print_head_to_head(h2h: &HeadToHead) {
        let name = h2h.player_name().unwrap_or("?");
        println!("{} ({})", h2h.key(), name);
        println!("───────────────────────────────");
        for game in h2h.games() {
            println!(
                "  {}  {:<30} {:>3}  {}  {}",
                game.tournament_date,
                game.tournament_name,
                game.round,
                game.color.code(),
                game.result.code()
            );
        }
        println!("  {}", h2h.summary());
    }

    pub fn player(config: &Config, id: &str) -> Result<()> {
        let fetcher = fetcher(config, false)?;
        match club::player_name(&PlayerId::from(id), &fetcher)? {
            Some(name) => println!("{}: {}", id, name),
            None => println!("{}: no member found", id),
        }
        Ok(())
    }

    pub fn status(config: &Config, club_id: &str, database: Option<String>) -> Result<()> {
        let path = database.unwrap_or_else(|| {
            config
                .data
                .database_path(club_id)
                .to_string_lossy()
                .into_owned()
        });
        if !Path::new(&path).exists() {
            return Err(ChessError::Config(format!("No database at {}", path)));
        }

        let db = Database::open(&path)?;
        let stats = db.get_stats()?;

        println!("Database Status");
        println!("───────────────────────────────");
        println!("  Path:      {}", path);
        if let Some(club) = db.get_club()? {
            println!("  Club:      {}", club);
        }
        println!("  Players:   {}", stats.player_count);
        println!("  Games:     {}", stats.game_count);
        println!("  Summaries: {}", stats.summary_count);
        if let (Some(earliest), Some(latest)) = (stats.earliest_game, stats.latest_game) {
            println!("  Range:     {} to {}", earliest, latest);
        }

        let bad = db.check_inversions()?;
        if bad.is_empty() {
            println!("  Inversion check: ok");
        } else {
            println!("  Inversion check: {} pairs without a matching inverse", bad.len());
            for key in bad {
                println!("    {}", key);
            }
        }

        Ok(())
    }
}
