//! Ranking handlers

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::AppState;
use spear_common::{
    config::RankingSettings,
    errors::{Result, SpearError},
    metrics::{self, RunSample},
};
use spear_engine::{
    Activity, CreditKind, RankedEntity, ScoreScale, Spear, SpearConfig, TiePolicy,
};

/// Most jobs accepted in one batch request
const MAX_BATCH_JOBS: usize = 10;

/// Ranking request
#[derive(Debug, Deserialize, Validate)]
pub struct RankRequest {
    /// An empty log is rejected by the engine as invalid input
    #[validate(nested)]
    pub activities: Vec<ActivityPayload>,

    #[serde(default)]
    #[validate(nested)]
    pub options: RankOptions,
}

/// One logged activity
#[derive(Debug, Deserialize, Validate)]
pub struct ActivityPayload {
    /// RFC 3339 timestamp
    pub timestamp: DateTime<Utc>,

    #[validate(length(min = 1, max = 512))]
    pub user: String,

    #[validate(length(min = 1, max = 2048))]
    pub resource: String,
}

/// Per-request overrides; anything unset falls back to the configured defaults
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RankOptions {
    pub credit: Option<CreditKind>,

    pub tie_policy: Option<TiePolicy>,

    pub score_scale: Option<ScoreScale>,

    #[validate(range(min = 1, max = 100_000))]
    pub max_iterations: Option<usize>,

    #[validate(range(min = 0.0, max = 1.0))]
    pub tolerance: Option<f64>,

    /// Truncate both rankings to this many entries
    #[validate(range(min = 1))]
    pub limit: Option<usize>,
}

/// Ranking response
#[derive(Debug, Serialize)]
pub struct RankResponse {
    pub run_id: Uuid,
    pub credit: CreditKind,

    /// Distinct users in the log
    pub users: usize,

    /// Distinct resources in the log
    pub resources: usize,

    pub iterations: usize,
    pub converged: bool,

    /// Scores alternated between two states at the iteration cap
    pub oscillating: bool,

    pub residual: f64,
    pub expertise: Vec<RankedEntity>,
    pub quality: Vec<RankedEntity>,
    pub processing_time_ms: u64,
}

/// Batch ranking request
#[derive(Debug, Deserialize)]
pub struct BatchRankRequest {
    pub jobs: Vec<RankRequest>,
}

/// Batch ranking response, results in request order
#[derive(Debug, Serialize)]
pub struct BatchRankResponse {
    pub results: Vec<RankResponse>,
    pub processing_time_ms: u64,
}

/// A validated request with defaults applied
#[derive(Debug)]
struct RankJob {
    activities: Vec<Activity<DateTime<Utc>>>,
    credit: CreditKind,
    config: SpearConfig,
    limit: Option<usize>,
}

impl RankJob {
    /// Validate and merge defaults, counting rejected requests as failed runs
    fn prepare(request: RankRequest, defaults: &RankingSettings) -> Result<Self> {
        Self::from_request(request, defaults)
            .inspect_err(|e| metrics::record_failure(e.code().as_str()))
    }

    fn from_request(request: RankRequest, defaults: &RankingSettings) -> Result<Self> {
        request.validate().map_err(validation_error)?;

        if request.activities.len() > defaults.max_activities {
            return Err(SpearError::PayloadTooLarge {
                size: request.activities.len(),
                limit: defaults.max_activities,
            });
        }

        let base = SpearConfig::try_from(defaults)?;
        let options = request.options;

        let mut config = base;
        config.ties = options.tie_policy.unwrap_or(base.ties);
        config.scale = options.score_scale.unwrap_or(base.scale);
        if let Some(max_iterations) = options.max_iterations {
            config.solver.max_iterations = max_iterations;
        }
        if let Some(tolerance) = options.tolerance {
            config.solver.tolerance = tolerance;
        }

        let credit = match options.credit {
            Some(credit) => credit,
            None => defaults.credit.parse()?,
        };

        let activities = request
            .activities
            .into_iter()
            .map(|a| Activity::new(a.timestamp, a.user, a.resource))
            .collect();

        Ok(Self {
            activities,
            credit,
            config,
            limit: options.limit,
        })
    }

    /// Run on the blocking pool; the solver is CPU bound
    async fn execute(self) -> Result<RankResponse> {
        let start = Instant::now();
        let credit = self.credit;
        let config = self.config;
        let activities = self.activities;

        let outcome = tokio::task::spawn_blocking(move || {
            Spear::new(activities).run_with(credit.build().as_ref(), &config)
        })
        .await
        .map_err(|e| SpearError::Internal {
            message: format!("ranking task failed: {}", e),
        })
        .and_then(|result| result);

        let mut outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::record_failure(e.code().as_str());
                return Err(e);
            }
        };

        let elapsed = start.elapsed();
        let users = outcome.expertise.len();
        let resources = outcome.quality.len();

        metrics::record_run(RunSample {
            credit: credit.as_str(),
            duration_secs: elapsed.as_secs_f64(),
            iterations: outcome.iterations,
            converged: outcome.converged,
            users,
            resources,
        });

        if let Some(limit) = self.limit {
            outcome.expertise.truncate(limit);
            outcome.quality.truncate(limit);
        }

        let run_id = Uuid::now_v7();
        info!(
            %run_id,
            credit = credit.as_str(),
            users,
            resources,
            iterations = outcome.iterations,
            converged = outcome.converged,
            "Ranking run completed"
        );

        Ok(RankResponse {
            run_id,
            credit,
            users,
            resources,
            iterations: outcome.iterations,
            converged: outcome.converged,
            oscillating: outcome.oscillating,
            residual: outcome.residual,
            expertise: outcome.expertise,
            quality: outcome.quality,
            processing_time_ms: elapsed.as_millis() as u64,
        })
    }
}

fn validation_error(errors: ValidationErrors) -> SpearError {
    let field = errors.errors().keys().next().map(|k| k.to_string());
    SpearError::Validation {
        message: errors.to_string(),
        field,
    }
}

/// Rank one activity log
pub async fn rank(
    State(state): State<AppState>,
    Json(request): Json<RankRequest>,
) -> Result<Json<RankResponse>> {
    let job = RankJob::prepare(request, &state.config.ranking)?;
    Ok(Json(job.execute().await?))
}

/// Rank several independent logs concurrently
pub async fn batch_rank(
    State(state): State<AppState>,
    Json(request): Json<BatchRankRequest>,
) -> Result<Json<BatchRankResponse>> {
    let start = Instant::now();

    if request.jobs.is_empty() || request.jobs.len() > MAX_BATCH_JOBS {
        return Err(SpearError::Validation {
            message: format!("batch must contain 1 to {} jobs", MAX_BATCH_JOBS),
            field: Some("jobs".to_string()),
        });
    }

    let jobs = request
        .jobs
        .into_iter()
        .map(|job| RankJob::prepare(job, &state.config.ranking))
        .collect::<Result<Vec<_>>>()?;

    let results = futures::future::try_join_all(jobs.into_iter().map(RankJob::execute)).await?;

    Ok(Json(BatchRankResponse {
        results,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}
