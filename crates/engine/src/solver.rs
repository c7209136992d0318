//! Mutual reinforcement solver
//!
//! Power iteration over the activity graph:
//!
//! ```text
//! Q'(r) = Σ_(u,r) E(u) · w(u,r)      quality from expertise
//! E'(u) = Σ_(u,r) Q(r) · w(u,r)      expertise from quality
//! ```
//!
//! Both updates read the previous iteration's vectors (Jacobi style), so the
//! result does not depend on node enumeration order. Each vector is rescaled
//! to unit L2 norm after every iteration. Weights are divided by the largest
//! weight before propagating; the normalized scores are invariant under that
//! scaling, and huge finite credits cannot overflow.
//!
//! When disconnected components share the same dominant singular value, the
//! Jacobi update alternates between two states instead of converging, and the
//! scores returned at the cap depend on its parity. Such runs report
//! `converged = false` and `oscillating = true`.

use crate::graph::{ActivityGraph, Edge};
use serde::{Deserialize, Serialize};
use spear_common::errors::{Result, SpearError};
use tracing::{debug, trace, warn};

/// Solver configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Maximum iterations
    pub max_iterations: usize,

    /// Convergence threshold on the L1 change of either vector
    pub tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 250,
            tolerance: 1e-9,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(SpearError::invalid_input("max_iterations must be at least 1"));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(SpearError::invalid_input(format!(
                "tolerance must be a finite non-negative number, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Final score vectors, indexed like the graph's users and resources
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreVectors {
    pub expertise: Vec<f64>,
    pub quality: Vec<f64>,

    /// Iterations actually run
    pub iterations: usize,

    /// False when the iteration cap was reached first
    pub converged: bool,

    /// L1 change of the last iteration
    pub residual: f64,

    /// The cap was reached while both vectors alternated between two states
    pub oscillating: bool,
}

/// Iterative expertise/quality solver
pub struct MutualReinforcementSolver {
    config: SolverConfig,
}

impl MutualReinforcementSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Run until the change drops below tolerance or the cap is reached.
    ///
    /// # Errors
    /// - `InvalidInput` for an invalid configuration
    /// - `DegenerateCredit` when a vector's norm is zero (every weight is 0)
    pub fn solve(&self, graph: &ActivityGraph) -> Result<ScoreVectors> {
        self.config.validate()?;

        let scale = if graph.max_weight() > 0.0 { graph.max_weight() } else { 1.0 };

        let mut expertise = vec![1.0; graph.user_count()];
        let mut quality = vec![1.0; graph.resource_count()];
        let mut next_expertise = vec![0.0; graph.user_count()];
        let mut next_quality = vec![0.0; graph.resource_count()];

        // Vectors from two iterations back, for cycle detection
        let mut older_expertise = vec![0.0; graph.user_count()];
        let mut older_quality = vec![0.0; graph.resource_count()];

        let mut residual = f64::INFINITY;
        let mut period_two = f64::INFINITY;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            iterations += 1;

            propagate(graph.resource_adjacency(), &expertise, scale, &mut next_quality);
            propagate(graph.user_adjacency(), &quality, scale, &mut next_expertise);

            normalize(&mut next_quality, iterations)?;
            normalize(&mut next_expertise, iterations)?;

            residual = l1_distance(&expertise, &next_expertise)
                .max(l1_distance(&quality, &next_quality));
            if iterations > 1 {
                period_two = l1_distance(&older_expertise, &next_expertise)
                    .max(l1_distance(&older_quality, &next_quality));
            }

            // older <- current, current <- next
            std::mem::swap(&mut older_expertise, &mut expertise);
            std::mem::swap(&mut expertise, &mut next_expertise);
            std::mem::swap(&mut older_quality, &mut quality);
            std::mem::swap(&mut quality, &mut next_quality);

            trace!(iteration = iterations, residual, "Reinforcement step");

            if residual < self.config.tolerance {
                converged = true;
                break;
            }
        }

        let oscillating = !converged && period_two < self.config.tolerance.max(f64::EPSILON);

        if converged {
            debug!(iterations, residual, "Scores converged");
        } else if oscillating {
            warn!(
                iterations,
                residual,
                period_two,
                "Scores alternate between two states; result depends on cap parity"
            );
        } else {
            warn!(
                iterations,
                residual,
                tolerance = self.config.tolerance,
                "Iteration cap reached before convergence"
            );
        }

        Ok(ScoreVectors {
            expertise,
            quality,
            iterations,
            converged,
            residual,
            oscillating,
        })
    }
}

/// `target[i] = Σ source[edge.node] · edge.weight / scale` over node i's edges
fn propagate(adjacency: &[Vec<Edge>], source: &[f64], scale: f64, target: &mut [f64]) {
    for (slot, edges) in target.iter_mut().zip(adjacency) {
        *slot = edges.iter().map(|e| source[e.node] * (e.weight / scale)).sum();
    }
}

/// Rescale to unit L2 norm. The norm is taken on the vector divided by its
/// largest entry, so squaring cannot overflow.
fn normalize(vector: &mut [f64], iteration: usize) -> Result<()> {
    let largest = vector.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));

    if largest == 0.0 {
        return Err(SpearError::DegenerateCredit { iteration });
    }
    if !largest.is_finite() {
        return Err(SpearError::Internal {
            message: format!("score vector overflowed at iteration {}", iteration),
        });
    }

    let norm = largest
        * vector
            .iter()
            .map(|x| {
                let scaled = x / largest;
                scaled * scaled
            })
            .sum::<f64>()
            .sqrt();

    for value in vector.iter_mut() {
        *value /= norm;
    }
    Ok(())
}

fn l1_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}
