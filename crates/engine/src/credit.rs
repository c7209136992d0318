//! Credit functions
//!
//! A credit function weighs one activity by its chronological position among
//! all activities on the same resource. Earlier actors should receive at
//! least as much credit as later ones.
//!
//! ```text
//! credit(rank, total)    rank  = 1-based position (1 = earliest)
//!                        total = activities on the resource
//! ```
//!
//! `ConstantCredit` switches the first-mover advantage off, which turns the
//! ranking into plain HITS.

use serde::{Deserialize, Serialize};
use spear_common::errors::SpearError;
use std::fmt;
use std::str::FromStr;

/// Weight of an activity given its rank on its resource.
///
/// Implementations must return a finite, non-negative value for every
/// `1 <= rank <= total`, including `total == 1`. Any
/// `Fn(usize, usize) -> f64` closure qualifies.
pub trait CreditFunction: Send + Sync {
    fn credit(&self, rank: usize, total: usize) -> f64;

    /// Label used in logs and metrics
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> CreditFunction for F
where
    F: Fn(usize, usize) -> f64 + Send + Sync,
{
    fn credit(&self, rank: usize, total: usize) -> f64 {
        self(rank, total)
    }
}

/// `C = 1` for every activity.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantCredit;

impl CreditFunction for ConstantCredit {
    fn credit(&self, _rank: usize, _total: usize) -> f64 {
        1.0
    }

    fn name(&self) -> &str {
        "constant"
    }
}

/// `C = 1 / rank`
#[derive(Debug, Clone, Copy, Default)]
pub struct ReciprocalCredit;

impl CreditFunction for ReciprocalCredit {
    fn credit(&self, rank: usize, _total: usize) -> f64 {
        1.0 / rank as f64
    }

    fn name(&self) -> &str {
        "reciprocal"
    }
}

/// `C = 1 / log2(rank + 1)`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogarithmicCredit;

impl CreditFunction for LogarithmicCredit {
    fn credit(&self, rank: usize, _total: usize) -> f64 {
        1.0 / (rank as f64 + 1.0).log2()
    }

    fn name(&self) -> &str {
        "logarithmic"
    }
}

/// `C = sqrt(total - rank + 1)`: the square root of the number of
/// activities at or after this one. The first of ten bookmarks gets
/// `sqrt(10)`, the last gets 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct FollowerRootCredit;

impl CreditFunction for FollowerRootCredit {
    fn credit(&self, rank: usize, total: usize) -> f64 {
        let followers = total.saturating_sub(rank) + 1;
        (followers as f64).sqrt()
    }

    fn name(&self) -> &str {
        "follower_root"
    }
}

/// Selector for the built-in credit functions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditKind {
    #[default]
    Constant,
    Reciprocal,
    Logarithmic,
    FollowerRoot,
}

impl CreditKind {
    /// Instantiate the selected credit function
    pub fn build(self) -> Box<dyn CreditFunction> {
        match self {
            CreditKind::Constant => Box::new(ConstantCredit),
            CreditKind::Reciprocal => Box::new(ReciprocalCredit),
            CreditKind::Logarithmic => Box::new(LogarithmicCredit),
            CreditKind::FollowerRoot => Box::new(FollowerRootCredit),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CreditKind::Constant => "constant",
            CreditKind::Reciprocal => "reciprocal",
            CreditKind::Logarithmic => "logarithmic",
            CreditKind::FollowerRoot => "follower_root",
        }
    }
}

impl fmt::Display for CreditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreditKind {
    type Err = SpearError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "constant" => Ok(CreditKind::Constant),
            "reciprocal" => Ok(CreditKind::Reciprocal),
            "logarithmic" => Ok(CreditKind::Logarithmic),
            "follower_root" => Ok(CreditKind::FollowerRoot),
            other => Err(SpearError::Configuration {
                message: format!("unknown credit function '{}'", other),
            }),
        }
    }
}
