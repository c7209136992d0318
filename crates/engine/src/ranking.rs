//! Ranking extraction
//!
//! Turns a score vector into a full ranking: score descending, equal scores
//! ordered by identifier ascending.

use serde::{Deserialize, Serialize};
use spear_common::errors::{Result, SpearError};
use std::str::FromStr;

/// Entity with its final score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntity {
    pub score: f64,
    pub id: String,
}

/// How reported scores are scaled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreScale {
    /// Unit L2 norm, as produced by the solver
    #[default]
    Unit,
    /// Rescaled so each ranking sums to 1
    Probability,
}

impl FromStr for ScoreScale {
    type Err = SpearError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unit" => Ok(ScoreScale::Unit),
            "probability" => Ok(ScoreScale::Probability),
            other => Err(SpearError::Configuration {
                message: format!("unknown score scale '{}'", other),
            }),
        }
    }
}

/// Pair scores with identifiers and sort them.
///
/// `ids` and `scores` are parallel slices.
pub fn rank_entities(ids: &[String], scores: &[f64], scale: ScoreScale) -> Vec<RankedEntity> {
    let divisor = match scale {
        ScoreScale::Unit => 1.0,
        ScoreScale::Probability => {
            let total: f64 = scores.iter().sum();
            if total > 0.0 { total } else { 1.0 }
        }
    };

    let mut ranked: Vec<RankedEntity> = ids
        .iter()
        .zip(scores)
        .map(|(id, &score)| RankedEntity {
            score: score / divisor,
            id: id.clone(),
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    ranked
}
