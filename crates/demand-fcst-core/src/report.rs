//! Export-ready report shaping. Pure transform, no I/O.

use std::collections::HashMap;

use serde::Serialize;

use crate::forecast::ForecastResult;
use crate::period::Granularity;
use crate::rollup::GroupRollup;
use crate::schema::{EntityConflict, RowIssue};
use crate::series::{Entity, InsufficientHistory};
use crate::trend::{TrendDirection, TrendSignal};

/// One forecast period of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRow {
    pub period: String,
    pub entity_id: String,
    pub entity_name: String,
    pub group_id: String,
    pub predicted: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ForecastRow {
    /// Column headers matching the field order.
    pub const HEADERS: [&'static str; 7] = [
        "period",
        "entity_id",
        "entity_name",
        "group_id",
        "predicted",
        "lower",
        "upper",
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendRow {
    pub entity_id: String,
    pub entity_name: String,
    pub group_id: String,
    pub direction: TrendDirection,
    pub delta: f64,
    pub recent_average: f64,
    pub forecast_average: f64,
    pub relative_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRow {
    pub entity_id: String,
    pub entity_name: String,
    pub group_id: String,
    pub reason: String,
}

/// Everything a sink needs to render one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub horizon: usize,
    pub forecasts: Vec<ForecastRow>,
    pub trends: Vec<TrendRow>,
    pub group_totals: Vec<GroupRollup>,
    pub insufficient_history: Vec<InsufficientHistory>,
    pub failures: Vec<FailureRow>,
    pub conflicts: Vec<EntityConflict>,
    pub row_issues: Vec<RowIssue>,
}

impl Report {
    /// Forecast rows for one entity, in period order.
    pub fn rows_for<'a>(&'a self, entity_id: &'a str) -> impl Iterator<Item = &'a ForecastRow> {
        self.forecasts.iter().filter(move |r| r.entity_id == entity_id)
    }

    pub fn trend_for(&self, entity_id: &str) -> Option<&TrendRow> {
        self.trends.iter().find(|t| t.entity_id == entity_id)
    }

    /// Trend rows keyed by entity id, for renderers that visit every entity.
    pub fn trend_index(&self) -> HashMap<&str, &TrendRow> {
        self.trends
            .iter()
            .map(|t| (t.entity_id.as_str(), t))
            .collect()
    }
}

/// Inputs of [`assemble`]; borrowed from the pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct ReportInputs<'a> {
    pub granularity: Granularity,
    pub horizon: usize,
    pub forecasts: &'a [ForecastResult],
    pub trends: &'a [(String, TrendSignal)],
    pub rollups: &'a [GroupRollup],
    pub insufficient: &'a [InsufficientHistory],
    pub failures: &'a [FailureRow],
    pub conflicts: &'a [EntityConflict],
    pub row_issues: &'a [RowIssue],
}

/// Shape run outputs into a [`Report`]: one forecast row per future period
/// per entity, entities in forecast order.
pub fn assemble(inputs: ReportInputs<'_>) -> Report {
    let forecasts = inputs
        .forecasts
        .iter()
        .flat_map(|f| {
            f.points.iter().map(move |p| ForecastRow {
                period: inputs.granularity.label(p.period),
                entity_id: f.entity.id.clone(),
                entity_name: f.entity.name.clone(),
                group_id: f.entity.group_id.clone(),
                predicted: p.point,
                lower: p.lower,
                upper: p.upper,
            })
        })
        .collect();

    let entities: HashMap<&str, &Entity> = inputs
        .forecasts
        .iter()
        .map(|f| (f.entity.id.as_str(), &f.entity))
        .collect();
    let trends = inputs
        .trends
        .iter()
        .filter_map(|(entity_id, signal)| {
            let entity = *entities.get(entity_id.as_str())?;
            Some(TrendRow {
                entity_id: entity.id.clone(),
                entity_name: entity.name.clone(),
                group_id: entity.group_id.clone(),
                direction: signal.direction,
                delta: signal.delta,
                recent_average: signal.recent_average,
                forecast_average: signal.forecast_average,
                relative_change: signal.relative_change,
            })
        })
        .collect();

    Report {
        horizon: inputs.horizon,
        forecasts,
        trends,
        group_totals: inputs.rollups.to_vec(),
        insufficient_history: inputs.insufficient.to_vec(),
        failures: inputs.failures.to_vec(),
        conflicts: inputs.conflicts.to_vec(),
        row_issues: inputs.row_issues.to_vec(),
    }
}
