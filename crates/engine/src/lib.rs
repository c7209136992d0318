//! SPEAR ranking engine
//!
//! Ranks users by expertise and resources by quality from a log of
//! (timestamp, user, resource) activities. Users who act early on resources
//! that turn out to be good gain expertise; resources acted on by experts
//! gain quality.
//!
//! ```text
//! activities ──► ActivityGraph ──► MutualReinforcementSolver ──► rank_entities
//!                (credit weights)   (Jacobi power iteration)     (sorted lists)
//! ```
//!
//! The credit function is the extension point. `ConstantCredit` (the
//! default) reduces the algorithm to HITS; `FollowerRootCredit` is the
//! first-mover weighting from "Telling Experts from Spammers" (SIGIR 2009).
//!
//! ```
//! use spear_engine::Spear;
//!
//! let spear = Spear::from_triples(vec![
//!     (1, "alice", "http://www.quuxlabs.com/"),
//!     (2, "bob", "http://www.quuxlabs.com/"),
//! ]);
//! let outcome = spear.run().unwrap();
//! assert_eq!(outcome.top_resource().unwrap().score, 1.0);
//! ```

pub mod activity;
pub mod credit;
pub mod graph;
pub mod ranking;
pub mod solver;

pub use activity::Activity;
pub use credit::{
    ConstantCredit, CreditFunction, CreditKind, FollowerRootCredit, LogarithmicCredit,
    ReciprocalCredit,
};
pub use graph::{ActivityGraph, Edge, TiePolicy};
pub use ranking::{rank_entities, RankedEntity, ScoreScale};
pub use solver::{MutualReinforcementSolver, ScoreVectors, SolverConfig};

use serde::{Deserialize, Serialize};
use spear_common::config::RankingSettings;
use spear_common::errors::{Result, SpearError};
use std::collections::BTreeSet;
use tracing::debug_span;

/// Everything a run needs besides the activities and the credit function
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpearConfig {
    pub solver: SolverConfig,
    pub ties: TiePolicy,
    pub scale: ScoreScale,
}

impl TryFrom<&RankingSettings> for SpearConfig {
    type Error = SpearError;

    fn try_from(settings: &RankingSettings) -> Result<Self> {
        let config = Self {
            solver: SolverConfig {
                max_iterations: settings.max_iterations,
                tolerance: settings.tolerance,
            },
            ties: settings.tie_policy.parse()?,
            scale: settings.score_scale.parse()?,
        };
        config.solver.validate().map_err(|e| SpearError::Configuration {
            message: e.to_string(),
        })?;
        Ok(config)
    }
}

/// Result of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpearOutcome {
    /// Users, best expert first
    pub expertise: Vec<RankedEntity>,

    /// Resources, best first
    pub quality: Vec<RankedEntity>,

    pub iterations: usize,

    /// False when the iteration cap was hit before the tolerance
    pub converged: bool,

    pub residual: f64,

    /// Scores alternated between two states when the cap was hit; see
    /// [`solver`]
    #[serde(default)]
    pub oscillating: bool,
}

impl SpearOutcome {
    pub fn top_expert(&self) -> Option<&RankedEntity> {
        self.expertise.first()
    }

    pub fn top_resource(&self) -> Option<&RankedEntity> {
        self.quality.first()
    }
}

/// A fixed activity log, ready to be ranked.
///
/// Holds no state between runs; concurrent runs on separate instances (or
/// on a shared reference) are independent.
#[derive(Debug, Clone)]
pub struct Spear<T> {
    activities: Vec<Activity<T>>,
}

impl<T: Ord> Spear<T> {
    /// Wrap an activity log. Validation happens when a run starts.
    pub fn new(activities: Vec<Activity<T>>) -> Self {
        Self { activities }
    }

    /// Build from `(timestamp, user, resource)` tuples
    pub fn from_triples<I, U, R>(triples: I) -> Self
    where
        I: IntoIterator<Item = (T, U, R)>,
        U: Into<String>,
        R: Into<String>,
    {
        Self::new(
            triples
                .into_iter()
                .map(|(timestamp, user, resource)| Activity::new(timestamp, user, resource))
                .collect(),
        )
    }

    pub fn activities(&self) -> &[Activity<T>] {
        &self.activities
    }

    /// Distinct users, ascending
    pub fn users(&self) -> Vec<&str> {
        let users: BTreeSet<&str> = self.activities.iter().map(|a| a.user.as_str()).collect();
        users.into_iter().collect()
    }

    /// Distinct resources, ascending
    pub fn resources(&self) -> Vec<&str> {
        let resources: BTreeSet<&str> =
            self.activities.iter().map(|a| a.resource.as_str()).collect();
        resources.into_iter().collect()
    }

    /// Rank with constant credit (plain HITS) and default settings
    pub fn run(&self) -> Result<SpearOutcome> {
        self.run_with(&ConstantCredit, &SpearConfig::default())
    }

    /// Build the graph, solve, and extract both rankings.
    ///
    /// # Errors
    /// - `InvalidInput`: empty log, blank identifier, or invalid solver settings
    /// - `InvalidCredit`: the credit function returned a negative or
    ///   non-finite weight
    /// - `DegenerateCredit`: every weight was zero
    pub fn run_with<C>(&self, credit: &C, config: &SpearConfig) -> Result<SpearOutcome>
    where
        C: CreditFunction + ?Sized,
    {
        let span = debug_span!(
            "spear_run",
            credit = credit.name(),
            activities = self.activities.len()
        );
        let _guard = span.enter();

        config.solver.validate()?;

        let graph = ActivityGraph::build(&self.activities, credit, config.ties)?;
        let scores = MutualReinforcementSolver::new(config.solver).solve(&graph)?;

        Ok(SpearOutcome {
            expertise: rank_entities(graph.users(), &scores.expertise, config.scale),
            quality: rank_entities(graph.resources(), &scores.quality, config.scale),
            iterations: scores.iterations,
            converged: scores.converged,
            residual: scores.residual,
            oscillating: scores.oscillating,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn at(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    const USERS: [&str; 4] = ["Steve Jobs", "Bill Gates", "Sergey Brin", "Larry Page"];
    const DOCS: [&str; 3] = ["D1", "D2", "D3"];

    /// The SIGIR 2009 sample log: four users bookmarking three documents
    fn sample_log() -> Spear<NaiveDateTime> {
        Spear::from_triples(vec![
            (at(2010, 7, 1, 9), USERS[0], DOCS[0]),
            (at(2010, 7, 2, 9), USERS[1], DOCS[0]),
            (at(2010, 6, 1, 9), USERS[0], DOCS[1]),
            (at(2010, 6, 1, 10), USERS[1], DOCS[1]),
            (at(2010, 6, 2, 11), USERS[2], DOCS[1]),
            (at(2010, 6, 10, 12), USERS[2], DOCS[2]),
            (at(2010, 6, 14, 12), USERS[3], DOCS[2]),
        ])
    }

    fn score_of(ranking: &[RankedEntity], id: &str) -> f64 {
        ranking.iter().find(|r| r.id == id).map(|r| r.score).unwrap()
    }

    #[test]
    fn test_reproduces_published_sample() {
        let config = SpearConfig {
            ties: TiePolicy::Shared,
            scale: ScoreScale::Probability,
            ..SpearConfig::default()
        };
        let outcome = sample_log().run_with(&FollowerRootCredit, &config).unwrap();

        let expertise = [
            (0.42154381, USERS[0]),
            (0.32808641, USERS[1]),
            (0.21227046, USERS[2]),
            (0.03809933, USERS[3]),
        ];
        let quality = [(0.52695009, DOCS[1]), (0.34629657, DOCS[0]), (0.12675334, DOCS[2])];

        assert!(outcome.converged);
        for (got, (score, id)) in outcome.expertise.iter().zip(expertise) {
            assert_eq!(got.id, id);
            assert!((got.score - score).abs() < 5e-8, "{}: {} vs {}", id, got.score, score);
        }
        for (got, (score, id)) in outcome.quality.iter().zip(quality) {
            assert_eq!(got.id, id);
            assert!((got.score - score).abs() < 5e-8, "{}: {} vs {}", id, got.score, score);
        }
    }

    #[test]
    fn test_constant_credit_sample_ties_break_by_name() {
        let outcome = sample_log().run().unwrap();

        // Steve Jobs and Bill Gates bookmarked the same documents
        assert_eq!(outcome.expertise[0].id, "Bill Gates");
        assert_eq!(outcome.expertise[1].id, "Steve Jobs");
        assert_eq!(outcome.expertise[0].score, outcome.expertise[1].score);
        assert!((outcome.expertise[0].score - 0.6120247641547104).abs() < 1e-8);
        assert_eq!(outcome.top_resource().unwrap().id, "D2");
        assert!((score_of(&outcome.quality, "D2") - 0.7804543196869349).abs() < 1e-8);
    }

    #[test]
    fn test_single_resource_symmetry() {
        let spear = Spear::from_triples(vec![
            (1, "alice", "http://www.quuxlabs.com/"),
            (2, "bob", "http://www.quuxlabs.com/"),
        ]);
        let outcome = spear.run().unwrap();

        assert_eq!(outcome.expertise.len(), 2);
        assert!(outcome.expertise[0].score > 0.0);
        assert_eq!(outcome.expertise[0].score, outcome.expertise[1].score);
        assert_eq!(outcome.expertise[0].id, "alice");

        let top = outcome.top_resource().unwrap();
        assert_eq!(top.id, "http://www.quuxlabs.com/");
        assert!((top.score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_first_mover_advantage() {
        let spear = Spear::from_triples(vec![(2, "bob", "R"), (1, "alice", "R")]);
        let outcome = spear.run_with(&ReciprocalCredit, &SpearConfig::default()).unwrap();

        assert_eq!(outcome.top_expert().unwrap().id, "alice");
        assert!((score_of(&outcome.expertise, "alice") - 2.0 / 5f64.sqrt()).abs() < 1e-9);
        assert!((score_of(&outcome.expertise, "bob") - 1.0 / 5f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_disconnected_components_are_independent() {
        let left = vec![(1, "a1", "X"), (2, "a2", "X"), (3, "a2", "Y"), (4, "a3", "Y")];
        let right = vec![
            (1, "b1", "Z"),
            (2, "b2", "Z"),
            (3, "b1", "W"),
            (4, "b3", "W"),
            (5, "b3", "V"),
        ];
        let combined: Vec<_> = left.iter().chain(right.iter()).cloned().collect();

        // Fixed iteration count so every run does exactly the same steps
        let config = SpearConfig {
            solver: SolverConfig { max_iterations: 60, tolerance: 0.0 },
            ..SpearConfig::default()
        };
        let whole = Spear::from_triples(combined).run_with(&ReciprocalCredit, &config).unwrap();

        for part in [left, right] {
            let alone = Spear::from_triples(part).run_with(&ReciprocalCredit, &config).unwrap();
            let users: Vec<&str> = alone.expertise.iter().map(|r| r.id.as_str()).collect();

            for pair in users.windows(2) {
                let ratio_alone =
                    score_of(&alone.expertise, pair[0]) / score_of(&alone.expertise, pair[1]);
                let ratio_whole =
                    score_of(&whole.expertise, pair[0]) / score_of(&whole.expertise, pair[1]);
                assert!(
                    (ratio_alone - ratio_whole).abs() < 1e-9 * ratio_alone,
                    "{} / {}: {} vs {}",
                    pair[0],
                    pair[1],
                    ratio_alone,
                    ratio_whole
                );
            }
        }
    }

    #[test]
    fn test_empty_log_is_invalid() {
        let spear: Spear<u64> = Spear::new(Vec::new());
        assert!(matches!(spear.run(), Err(SpearError::InvalidInput { .. })));
    }

    #[test]
    fn test_zero_credit_is_degenerate() {
        let zero = |_rank: usize, _total: usize| 0.0;
        let result = sample_log().run_with(&zero, &SpearConfig::default());
        assert!(matches!(result, Err(SpearError::DegenerateCredit { iteration: 1 })));
    }

    #[test]
    fn test_huge_credit_ranks_like_constant() {
        let huge = |_rank: usize, _total: usize| 1e200;
        let spear = Spear::from_triples(vec![(1, "alice", "R"), (2, "bob", "R")]);
        let outcome = spear.run_with(&huge, &SpearConfig::default()).unwrap();

        assert_eq!(outcome.top_resource().unwrap().score, 1.0);
        assert_eq!(outcome.expertise[0].score, outcome.expertise[1].score);
        assert!(!outcome.oscillating);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let spear = sample_log();
        let config = SpearConfig { ties: TiePolicy::Shared, ..SpearConfig::default() };

        let first = spear.run_with(&LogarithmicCredit, &config).unwrap();
        let second = spear.run_with(&LogarithmicCredit, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_input_order_does_not_matter_for_distinct_timestamps() {
        let mut triples: Vec<(u32, String, String)> = (0..40u32)
            .map(|i| (i * 7 % 41, format!("user{}", i % 9), format!("doc{}", i % 6)))
            .collect();
        let baseline = Spear::from_triples(triples.clone())
            .run_with(&FollowerRootCredit, &SpearConfig::default())
            .unwrap();

        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..5 {
            triples.shuffle(&mut rng);
            let shuffled = Spear::from_triples(triples.clone())
                .run_with(&FollowerRootCredit, &SpearConfig::default())
                .unwrap();
            assert_eq!(shuffled, baseline);
        }
    }

    #[test]
    fn test_boxed_credit_from_kind() {
        let credit = CreditKind::FollowerRoot.build();
        let boxed = sample_log().run_with(credit.as_ref(), &SpearConfig::default()).unwrap();
        let direct = sample_log().run_with(&FollowerRootCredit, &SpearConfig::default()).unwrap();
        assert_eq!(boxed, direct);
    }

    #[test]
    fn test_users_and_resources() {
        let spear = sample_log();
        assert_eq!(spear.users(), ["Bill Gates", "Larry Page", "Sergey Brin", "Steve Jobs"]);
        assert_eq!(spear.resources(), ["D1", "D2", "D3"]);
        assert_eq!(spear.activities().len(), 7);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = RankingSettings {
            tie_policy: "shared".to_string(),
            score_scale: "probability".to_string(),
            max_iterations: 40,
            ..RankingSettings::default()
        };
        let config = SpearConfig::try_from(&settings).unwrap();
        assert_eq!(config.ties, TiePolicy::Shared);
        assert_eq!(config.scale, ScoreScale::Probability);
        assert_eq!(config.solver.max_iterations, 40);

        let broken = RankingSettings { max_iterations: 0, ..RankingSettings::default() };
        assert!(matches!(
            SpearConfig::try_from(&broken),
            Err(SpearError::Configuration { .. })
        ));
    }
}
