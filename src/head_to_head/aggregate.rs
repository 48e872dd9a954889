//! Head-to-head records for every pair of players on a roster
//!
//! Each unordered pair is fetched once, from the side of the player listed
//! first on the roster. The other side is derived by inversion.

use super::game::Game;
use super::loader::{HeadToHead, HeadToHeadLoader};
use super::summary::{PairKey, PairSummary};
use crate::data::scrapers::PageFetcher;
use crate::{AggregateConfig, ChessError, FailurePolicy, Player, Result};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Durable storage for aggregation output.
///
/// Writes are keyed on the record's natural key. Writing an identical record
/// again is a no-op; a summary with new counts replaces the stored one. The
/// return value says whether anything was stored.
pub trait PersistenceSink {
    fn write_game(&mut self, game: &Game) -> Result<bool>;
    fn write_summary(&mut self, summary: &PairSummary) -> Result<bool>;
}

/// Outcome of a roster run
#[derive(Debug, Default)]
pub struct Aggregation {
    /// Summary for every ordered pair that was loaded, both directions
    pub summaries: BTreeMap<PairKey, PairSummary>,
    /// Head-to-head pages requested
    pub fetches: usize,
    /// Game records handed to the sink, both directions
    pub games_written: usize,
    /// Pairs left out under `FailurePolicy::Skip`, with the reason
    pub skipped: Vec<(PairKey, String)>,
}

impl Aggregation {
    /// Ordered pairs whose inverse is missing or does not mirror them
    pub fn inconsistent_pairs(&self) -> Vec<&PairKey> {
        self.summaries
            .iter()
            .filter(|(key, summary)| {
                self.summaries
                    .get(&key.inverse())
                    .map_or(true, |inverse| !inverse.is_inverse_of(summary))
            })
            .map(|(key, _)| key)
            .collect()
    }
}

/// Every `(i, j)` with `i < j`, in roster order
pub fn roster_pairs(n: usize) -> Vec<(usize, usize)> {
    (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .collect()
}

pub struct RosterAggregator<F> {
    loader: HeadToHeadLoader<F>,
    policy: FailurePolicy,
    jobs: usize,
}

impl<F: PageFetcher + Sync> RosterAggregator<F> {
    pub fn new(fetcher: F, config: &AggregateConfig) -> Self {
        RosterAggregator {
            loader: HeadToHeadLoader::new(fetcher),
            policy: config.failure_policy,
            jobs: config.jobs.max(1),
        }
    }

    /// Load every pair on the roster and write both sides to `sink`.
    ///
    /// Under `FailurePolicy::Abort` the first failing pair ends the run;
    /// records already written for earlier pairs stay in the sink.
    pub fn run<S: PersistenceSink>(&self, roster: &[Player], sink: &mut S) -> Result<Aggregation> {
        let pairs = roster_pairs(roster.len());
        log::info!(
            "Loading {} pairs for {} players",
            pairs.len(),
            roster.len()
        );

        let mut aggregation = Aggregation::default();

        if self.jobs == 1 {
            for (n, &(i, j)) in pairs.iter().enumerate() {
                log::info!("[{}/{}] {} vs {}", n + 1, pairs.len(), roster[i], roster[j]);
                let loaded = self.load_pair(roster, i, j);
                aggregation.fetches += 1;
                self.record(roster, (i, j), loaded, sink, &mut aggregation)?;
            }
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.jobs)
                .build()
                .map_err(|e| ChessError::Config(format!("Failed to start worker pool: {}", e)))?;

            // Under Abort, no new loads start once one has failed
            let stop = AtomicBool::new(false);
            let loaded: Vec<Option<Result<HeadToHead>>> = pool.install(|| {
                pairs
                    .par_iter()
                    .map(|&(i, j)| {
                        if stop.load(Ordering::SeqCst) {
                            return None;
                        }
                        log::info!("{} vs {}", roster[i], roster[j]);
                        let result = self.load_pair(roster, i, j);
                        if result.is_err() && self.policy == FailurePolicy::Abort {
                            stop.store(true, Ordering::SeqCst);
                        }
                        Some(result)
                    })
                    .collect()
            });

            // Written in roster order so the sink sees the same sequence as a
            // sequential run. Pairs ahead of the first failure that were never
            // started are loaded here.
            for (&(i, j), result) in pairs.iter().zip(loaded) {
                let result = result.unwrap_or_else(|| self.load_pair(roster, i, j));
                aggregation.fetches += 1;
                self.record(roster, (i, j), result, sink, &mut aggregation)?;
            }
        }

        log::info!(
            "Stored {} summaries and {} games ({} pairs skipped)",
            aggregation.summaries.len(),
            aggregation.games_written,
            aggregation.skipped.len()
        );
        Ok(aggregation)
    }

    fn load_pair(&self, roster: &[Player], i: usize, j: usize) -> Result<HeadToHead> {
        self.loader.load_player(&roster[i], &roster[j].id)
    }

    fn record<S: PersistenceSink>(
        &self,
        roster: &[Player],
        (i, j): (usize, usize),
        loaded: Result<HeadToHead>,
        sink: &mut S,
        aggregation: &mut Aggregation,
    ) -> Result<()> {
        let forward = match loaded {
            Ok(h2h) => h2h,
            Err(e) => {
                let key = PairKey::new(roster[i].id.clone(), roster[j].id.clone());
                return match self.policy {
                    FailurePolicy::Abort => {
                        log::error!("Failed to load {}: {}", key, e);
                        Err(e)
                    }
                    FailurePolicy::Skip => {
                        log::warn!("Skipping {}: {}", key, e);
                        aggregation.skipped.push((key, e.to_string()));
                        Ok(())
                    }
                };
            }
        };

        let inverse = forward.invert();
        for side in [&forward, &inverse] {
            for game in side.games() {
                sink.write_game(game)?;
                aggregation.games_written += 1;
            }
            sink.write_summary(side.summary())?;
            aggregation
                .summaries
                .insert(side.key().clone(), side.summary().clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::scrapers::uschess::head_to_head_url;
    use crate::head_to_head::game::GameResult;
    use crate::PlayerId;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    const NO_GAMES: &str = "<html><body><p>No games</p></body></html>";

    /// Serves canned pages; anything unknown is an empty history
    struct FakeFetcher {
        pages: HashMap<String, String>,
        failing: HashSet<String>,
        calls: AtomicUsize,
        urls: Mutex<Vec<String>>,
        /// Latency of every successful fetch
        delay: Duration,
    }

    impl FakeFetcher {
        fn new() -> Self {
            FakeFetcher {
                pages: HashMap::new(),
                failing: HashSet::new(),
                calls: AtomicUsize::new(0),
                urls: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn with_games(mut self, pid: &str, oid: &str, results: &[&str]) -> Self {
            let rows: Vec<String> = results
                .iter()
                .enumerate()
                .map(|(round, result)| {
                    format!(
                        r#"<tr><td><a href="http://msa.uschess.org/XtblMain.php?202405019692">SPRING OPEN</a></td>
                        <td>OPEN</td><td>{}</td><td>W</td><td>{}</td><td>OPPONENT</td><td>1500</td><td>{}</td></tr>"#,
                        round + 1,
                        oid,
                        result
                    )
                })
                .collect();
            let html = format!(
                r#"<table><tr><td>Name</td><td>PLAYER {}</td></tr></table>
                <table><tr><th>Event Name</th></tr>{}<tr><td>Search for more</td></tr></table>"#,
                pid,
                rows.join("")
            );
            self.pages.insert(url(pid, oid), html);
            self
        }

        fn failing_on(mut self, pid: &str, oid: &str) -> Self {
            self.failing.insert(url(pid, oid));
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PageFetcher for FakeFetcher {
        fn fetch(&self, url: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url.to_string());
            if self.failing.contains(url) {
                return Err(ChessError::HttpStatus {
                    status: 500,
                    url: url.to_string(),
                });
            }
            std::thread::sleep(self.delay);
            Ok(self
                .pages
                .get(url)
                .cloned()
                .unwrap_or_else(|| NO_GAMES.to_string()))
        }
    }

    #[derive(Default)]
    struct MemorySink {
        games: Vec<Game>,
        summaries: Vec<PairSummary>,
    }

    impl PersistenceSink for MemorySink {
        fn write_game(&mut self, game: &Game) -> Result<bool> {
            self.games.push(game.clone());
            Ok(true)
        }

        fn write_summary(&mut self, summary: &PairSummary) -> Result<bool> {
            self.summaries.push(summary.clone());
            Ok(true)
        }
    }

    fn url(pid: &str, oid: &str) -> String {
        head_to_head_url(&PlayerId::from(pid), &PlayerId::from(oid))
    }

    fn roster(n: usize) -> Vec<Player> {
        (0..n)
            .map(|i| Player::new(format!("1000000{}", i), format!("PLAYER {}", i)))
            .collect()
    }

    fn config(policy: FailurePolicy, jobs: usize) -> AggregateConfig {
        AggregateConfig {
            failure_policy: policy,
            jobs,
        }
    }

    fn sample_fetcher() -> FakeFetcher {
        FakeFetcher::new()
            .with_games("10000000", "10000001", &["W", "W", "W", "L", "D", "D"])
            .with_games("10000001", "10000003", &["L"])
            .with_games("10000002", "10000003", &["D", "W"])
    }

    #[test]
    fn test_roster_pairs() {
        assert!(roster_pairs(0).is_empty());
        assert!(roster_pairs(1).is_empty());
        assert_eq!(
            roster_pairs(4),
            vec![(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]
        );
        assert_eq!(roster_pairs(10).len(), 45);
    }

    #[test]
    fn test_every_ordered_pair_is_present_and_mirrored() {
        let fetcher = sample_fetcher();
        let aggregator = RosterAggregator::new(&fetcher, &config(FailurePolicy::Abort, 1));
        let mut sink = MemorySink::default();
        let players = roster(4);

        let result = aggregator.run(&players, &mut sink).unwrap();

        assert_eq!(result.summaries.len(), 4 * 3);
        assert!(result.inconsistent_pairs().is_empty());
        for a in &players {
            for b in &players {
                if a.id != b.id {
                    let key = PairKey::new(a.id.clone(), b.id.clone());
                    assert!(result.summaries.contains_key(&key), "missing {}", key);
                }
            }
        }

        let key = PairKey::new(PlayerId::from("10000001"), PlayerId::from("10000000"));
        let summary = &result.summaries[&key];
        assert_eq!((summary.wins(), summary.losses(), summary.draws()), (1, 3, 2));
        assert!((summary.pct() - 33.33).abs() < 0.01);

        let empty = PairKey::new(PlayerId::from("10000003"), PlayerId::from("10000000"));
        assert!(result.summaries[&empty].is_empty());
    }

    #[test]
    fn test_each_pair_is_fetched_once() {
        let fetcher = sample_fetcher();
        let aggregator = RosterAggregator::new(&fetcher, &config(FailurePolicy::Abort, 1));
        let mut sink = MemorySink::default();

        let result = aggregator.run(&roster(5), &mut sink).unwrap();

        assert_eq!(fetcher.calls(), 5 * 4 / 2);
        assert_eq!(result.fetches, 10);

        let urls = fetcher.urls.lock().unwrap();
        let unique: HashSet<&String> = urls.iter().collect();
        assert_eq!(unique.len(), urls.len());
        // Never the mirrored direction
        assert!(!urls.contains(&url("10000001", "10000000")));
    }

    #[test]
    fn test_sink_receives_both_directions() {
        let fetcher = sample_fetcher();
        let aggregator = RosterAggregator::new(&fetcher, &config(FailurePolicy::Abort, 1));
        let mut sink = MemorySink::default();

        let result = aggregator.run(&roster(4), &mut sink).unwrap();

        // 6 + 1 + 2 games, each stored from both sides
        assert_eq!(sink.games.len(), 18);
        assert_eq!(result.games_written, 18);
        assert_eq!(sink.summaries.len(), 12);

        for game in &sink.games {
            let mirrors = sink
                .games
                .iter()
                .filter(|g| **g == game.invert())
                .count();
            assert_eq!(mirrors, 1);
        }

        let losses_for_first = sink
            .games
            .iter()
            .filter(|g| g.player_id.as_str() == "10000001" && g.opponent_id.as_str() == "10000000")
            .filter(|g| g.result == GameResult::Loss)
            .count();
        assert_eq!(losses_for_first, 3);
    }

    #[test]
    fn test_abort_stops_on_first_failure() {
        let fetcher = sample_fetcher().failing_on("10000000", "10000002");
        let aggregator = RosterAggregator::new(&fetcher, &config(FailurePolicy::Abort, 1));
        let mut sink = MemorySink::default();

        let err = aggregator.run(&roster(4), &mut sink).unwrap_err();
        assert!(matches!(err, ChessError::HttpStatus { status: 500, .. }));

        // (0,1) written, (0,2) failed, nothing after
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(sink.summaries.len(), 2);
    }

    #[test]
    fn test_skip_continues_past_failures() {
        let fetcher = sample_fetcher().failing_on("10000000", "10000002");
        let aggregator = RosterAggregator::new(&fetcher, &config(FailurePolicy::Skip, 1));
        let mut sink = MemorySink::default();

        let result = aggregator.run(&roster(4), &mut sink).unwrap();

        assert_eq!(fetcher.calls(), 6);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.summaries.len(), 12 - 2);
        assert!(result.inconsistent_pairs().is_empty());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let players = roster(6);

        let sequential_fetcher = sample_fetcher();
        let sequential = RosterAggregator::new(&sequential_fetcher, &config(FailurePolicy::Abort, 1))
            .run(&players, &mut MemorySink::default())
            .unwrap();

        let parallel_fetcher = sample_fetcher();
        let mut parallel_sink = MemorySink::default();
        let parallel = RosterAggregator::new(&parallel_fetcher, &config(FailurePolicy::Abort, 4))
            .run(&players, &mut parallel_sink)
            .unwrap();

        assert_eq!(parallel_fetcher.calls(), 15);
        assert_eq!(parallel.fetches, 15);
        assert_eq!(parallel.summaries, sequential.summaries);
        assert_eq!(parallel_sink.summaries.len(), 30);
    }

    #[test]
    fn test_parallel_abort_stops_scheduling_loads() {
        let fetcher = sample_fetcher()
            .with_delay(Duration::from_millis(50))
            .failing_on("10000000", "10000002");
        let aggregator = RosterAggregator::new(&fetcher, &config(FailurePolicy::Abort, 4));
        let mut sink = MemorySink::default();

        let err = aggregator.run(&roster(8), &mut sink).unwrap_err();
        assert!(matches!(err, ChessError::HttpStatus { status: 500, .. }));

        assert!(fetcher.calls() < 8 * 7 / 2, "fetched {} pages", fetcher.calls());
        // Only (0,1) precedes the failure
        assert_eq!(sink.summaries.len(), 2);
        assert_eq!(
            sink.summaries[0].key(),
            &PairKey::new(PlayerId::from("10000000"), PlayerId::from("10000001"))
        );
    }

    #[test]
    fn test_small_rosters() {
        let fetcher = FakeFetcher::new();
        let aggregator = RosterAggregator::new(&fetcher, &config(FailurePolicy::Abort, 1));

        let result = aggregator.run(&[], &mut MemorySink::default()).unwrap();
        assert!(result.summaries.is_empty());

        let result = aggregator.run(&roster(1), &mut MemorySink::default()).unwrap();
        assert!(result.summaries.is_empty());
        assert_eq!(fetcher.calls(), 0);
    }
}
