//! One run of the normalization-to-forecast-to-rollup pipeline.
//!
//! Per-entity forecasts fan out over a bounded rayon pool and join before
//! trend analysis and rollup. A failure, panic or timeout in one entity's
//! fit is recorded against that entity only.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, info_span, warn};

use crate::config::{PipelineConfig, RunRequest};
use crate::error::{PipelineError, Result};
use crate::forecast::{capability_for, ForecastCapability, ForecastEngine, ForecastResult};
use crate::report::{self, FailureRow, Report, ReportInputs};
use crate::rollup::{build_groups, rollup_all, ExclusionReason, Group, GroupRollup};
use crate::schema::{normalize, NormalizedBatch, RawBatch};
use crate::series::{Entity, EntitySeries, InsufficientHistory, SeriesBuilder, SeriesSet};
use crate::trend::{TrendAnalyzer, TrendSignal};

/// Counters describing one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rows_read: usize,
    pub rows_used: usize,
    pub rows_skipped: usize,
    pub rows_filtered: usize,
    pub entities_forecast: usize,
    pub entities_insufficient: usize,
    pub entities_failed: usize,
}

/// Everything one run produced. Owned by the caller; nothing is shared with
/// the pipeline after `run` returns.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Series of the selected entities that met the history threshold.
    pub series: Vec<EntitySeries>,
    pub forecasts: Vec<ForecastResult>,
    pub trends: Vec<(String, TrendSignal)>,
    pub rollups: Vec<GroupRollup>,
    pub report: Report,
    pub summary: RunSummary,
}

/// A configured pipeline. Reusable across runs; holds no per-run state.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    builder: SeriesBuilder,
    engine: ForecastEngine,
    analyzer: TrendAnalyzer,
}

impl Pipeline {
    /// Build a pipeline with the capability selected by `config.model`.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let capability = capability_for(
            config.model,
            config.ets_spec.as_deref(),
            config.confidence_level,
        )?;
        Self::with_capability(config, capability)
    }

    /// Build a pipeline around an explicit forecasting capability.
    pub fn with_capability(
        config: PipelineConfig,
        capability: Arc<dyn ForecastCapability>,
    ) -> Result<Self> {
        config.validate()?;
        let builder =
            SeriesBuilder::new(config.granularity, config.min_history)?.fill_gaps(config.fill_gaps);
        let engine = ForecastEngine::new(capability, config.max_horizon, config.season_length());
        let analyzer =
            TrendAnalyzer::new(config.lookback_periods)?.with_stable_tolerance(config.stable_tolerance)?;
        Ok(Self {
            config,
            builder,
            engine,
            analyzer,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one batch to completion.
    ///
    /// Fails only for batch-level problems: unmapped required fields, an
    /// out-of-range horizon, a selection matching no entity, or a worker
    /// pool that cannot start. Entity-level problems land in the report.
    pub fn run(&self, batch: &RawBatch, request: &RunRequest) -> Result<PipelineOutput> {
        let span = info_span!("pipeline_run", horizon = request.horizon, rows = batch.len());
        let _guard = span.enter();
        let started = Instant::now();

        self.engine.validate_horizon(request.horizon)?;

        let normalized = normalize(
            batch,
            &self.config.synonyms,
            self.config.movement_filter.as_deref(),
        )?;
        info!(
            rows = normalized.rows.len(),
            mapped = normalized.mapping.columns.len(),
            unmapped = normalized.mapping.unmapped.len(),
            filtered = normalized.filtered_out,
            "batch normalized"
        );

        let full = self.builder.build(&normalized.rows);
        let set = select(&full, request)?;
        for skipped in &set.insufficient {
            info!(
                entity = %skipped.entity.id,
                periods = skipped.periods,
                required = skipped.required,
                "excluded for insufficient history"
            );
        }

        let outcomes = self.forecast_all(&set.series, request.horizon)?;

        let mut forecasts = Vec::with_capacity(outcomes.len());
        let mut trends = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        let mut exclusions: HashMap<String, ExclusionReason> = full
            .insufficient
            .iter()
            .map(|i| (i.entity.id.clone(), ExclusionReason::InsufficientHistory))
            .collect();

        for (entry, outcome) in set.series.iter().zip(outcomes) {
            match outcome {
                Ok(forecast) => {
                    let signal = self.analyzer.analyze(&entry.series, &forecast);
                    debug!(entity = %entry.entity.id, direction = %signal.direction, delta = signal.delta, "trend");
                    trends.push((entry.entity.id.clone(), signal));
                    forecasts.push(forecast);
                }
                Err(err) => {
                    warn!(entity = %entry.entity.id, error = %err, "forecast failed");
                    exclusions.insert(entry.entity.id.clone(), ExclusionReason::ForecastFailed);
                    failures.push(failure_row(&entry.entity, err));
                }
            }
        }

        let groups = touched_groups(&full, &set);
        let rollups = rollup_all(&forecasts, &groups, request.horizon, &exclusions);

        let report = report::assemble(ReportInputs {
            granularity: self.config.granularity,
            horizon: request.horizon,
            forecasts: &forecasts,
            trends: &trends,
            rollups: &rollups,
            insufficient: &set.insufficient,
            failures: &failures,
            conflicts: &normalized.conflicts,
            row_issues: &normalized.row_issues,
        });

        let summary = summarize(batch, &normalized, &set, forecasts.len(), failures.len());
        info!(
            forecast = summary.entities_forecast,
            insufficient = summary.entities_insufficient,
            failed = summary.entities_failed,
            groups = rollups.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline run complete"
        );

        Ok(PipelineOutput {
            series: set.series,
            forecasts,
            trends,
            rollups,
            report,
            summary,
        })
    }

    /// Forecast every series on a pool of `config.workers` threads. Results
    /// come back in input order.
    fn forecast_all(
        &self,
        series: &[EntitySeries],
        horizon: usize,
    ) -> Result<Vec<Result<ForecastResult>>> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("fcst-worker-{}", i))
            .build()
            .map_err(|e| PipelineError::InternalError(format!("worker pool: {}", e)))?;

        let threads = pool.current_num_threads();
        let slots = FitSlots::new(threads);
        debug!(entities = series.len(), threads, "fitting");
        Ok(pool.install(|| {
            series
                .par_iter()
                .map(|entry| self.forecast_one(entry, horizon, &slots))
                .collect()
        }))
    }

    fn forecast_one(
        &self,
        entry: &EntitySeries,
        horizon: usize,
        slots: &Arc<FitSlots>,
    ) -> Result<ForecastResult> {
        debug!(entity = %entry.entity.id, periods = entry.series.len(), "fit");
        let Some(limit_ms) = self.config.fit_timeout_ms else {
            return guarded_forecast(&self.engine, entry, horizon);
        };
        let limit = Duration::from_millis(limit_ms);

        // A timed-out fit keeps running and keeps its slot, so fit threads
        // never outnumber the pool.
        let Some(slot) = slots.acquire(limit) else {
            return Err(PipelineError::Forecasting {
                entity: entry.entity.id.clone(),
                reason: format!("no fit slot free within {} ms", limit_ms),
            });
        };

        let (tx, rx) = mpsc::channel();
        let engine = self.engine.clone();
        let owned = entry.clone();
        thread::Builder::new()
            .name(format!("fit-{}", entry.entity.id))
            .spawn(move || {
                let result = guarded_forecast(&engine, &owned, horizon);
                drop(slot);
                // receiver may have timed out already
                let _ = tx.send(result);
            })
            .map_err(|e| {
                PipelineError::InternalError(format!("spawn fit thread: {}", e))
                    .for_entity(&entry.entity.id)
            })?;

        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(PipelineError::Forecasting {
                entity: entry.entity.id.clone(),
                reason: format!("fit exceeded {} ms", limit_ms),
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(PipelineError::Forecasting {
                entity: entry.entity.id.clone(),
                reason: "fit thread exited without a result".to_string(),
            }),
        }
    }
}

/// Counting gate over fit threads, sized to the worker pool.
#[derive(Debug)]
struct FitSlots {
    capacity: usize,
    in_use: Mutex<usize>,
    freed: Condvar,
}

impl FitSlots {
    fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            in_use: Mutex::new(0),
            freed: Condvar::new(),
        })
    }

    /// Take a slot, waiting at most `wait` for one to free up.
    fn acquire(self: &Arc<Self>, wait: Duration) -> Option<FitSlot> {
        let guard = self.in_use.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut in_use, _) = self
            .freed
            .wait_timeout_while(guard, wait, |n| *n >= self.capacity)
            .unwrap_or_else(PoisonError::into_inner);
        if *in_use >= self.capacity {
            return None;
        }
        *in_use += 1;
        Some(FitSlot(Arc::clone(self)))
    }
}

/// Held by one fit thread; dropping it frees the slot.
struct FitSlot(Arc<FitSlots>);

impl Drop for FitSlot {
    fn drop(&mut self) {
        let mut in_use = self.0.in_use.lock().unwrap_or_else(PoisonError::into_inner);
        *in_use = in_use.saturating_sub(1);
        self.0.freed.notify_one();
    }
}

/// Run one forecast, turning a panic into that entity's failure.
fn guarded_forecast(
    engine: &ForecastEngine,
    entry: &EntitySeries,
    horizon: usize,
) -> Result<ForecastResult> {
    match catch_unwind(AssertUnwindSafe(|| {
        engine.forecast(&entry.entity, &entry.series, horizon)
    })) {
        Ok(result) => result,
        Err(payload) => Err(PipelineError::Forecasting {
            entity: entry.entity.id.clone(),
            reason: format!("panic during fit: {}", panic_message(payload.as_ref())),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Restrict a series set to the requested group and/or entity.
fn select(set: &SeriesSet, request: &RunRequest) -> Result<SeriesSet> {
    if request.group.is_none() && request.entity.is_none() {
        return Ok(set.clone());
    }
    let keep = |entity: &Entity| {
        request.group.as_ref().map_or(true, |g| &entity.group_id == g)
            && request.entity.as_ref().map_or(true, |e| &entity.id == e)
    };

    let series: Vec<EntitySeries> = set
        .series
        .iter()
        .filter(|s| keep(&s.entity))
        .cloned()
        .collect();
    let insufficient: Vec<InsufficientHistory> = set
        .insufficient
        .iter()
        .filter(|i| keep(&i.entity))
        .cloned()
        .collect();

    if series.is_empty() && insufficient.is_empty() {
        let wanted: Vec<String> = [
            request.entity.as_ref().map(|e| format!("entity '{}'", e)),
            request.group.as_ref().map(|g| format!("group '{}'", g)),
        ]
        .into_iter()
        .flatten()
        .collect();
        return Err(PipelineError::InvalidInput(format!(
            "no data for {}",
            wanted.join(" in ")
        )));
    }
    let order = set.order.iter().filter(|e| keep(*e)).cloned().collect();
    Ok(SeriesSet {
        series,
        insufficient,
        order,
    })
}

/// Every group the selection touches, with all of its members from the
/// unselected set. Members outside the selection end up excluded rather
/// than missing.
fn touched_groups(full: &SeriesSet, selected: &SeriesSet) -> Vec<Group> {
    let touched: HashSet<&str> = selected.entities().map(|e| e.group_id.as_str()).collect();
    build_groups(full.entities().filter(|e| touched.contains(e.group_id.as_str())))
}

fn failure_row(entity: &Entity, err: PipelineError) -> FailureRow {
    let reason = match err {
        PipelineError::Forecasting { reason, .. } => reason,
        other => other.to_string(),
    };
    FailureRow {
        entity_id: entity.id.clone(),
        entity_name: entity.name.clone(),
        group_id: entity.group_id.clone(),
        reason,
    }
}

fn summarize(
    batch: &RawBatch,
    normalized: &NormalizedBatch,
    set: &SeriesSet,
    forecast: usize,
    failed: usize,
) -> RunSummary {
    RunSummary {
        rows_read: batch.len(),
        rows_used: normalized.rows.len(),
        rows_skipped: normalized.row_issues.len(),
        rows_filtered: normalized.filtered_out,
        entities_forecast: forecast,
        entities_insufficient: set.insufficient.len(),
        entities_failed: failed,
    }
}
