//! Core library for per-item demand forecasting from ERP movement exports.
//!
//! A run normalizes a raw table to a canonical schema, builds one period
//! series per item, forecasts each item independently, classifies the trend
//! against recent history, and rolls forecasts up per group. Everything here
//! is pure computation; reading inputs and writing reports live in the CLI
//! crate.

pub mod config;
pub mod error;
pub mod forecast;
pub mod period;
pub mod pipeline;
pub mod report;
pub mod rollup;
pub mod schema;
pub mod series;
pub mod trend;

// Re-exports for convenience
pub use config::{PipelineConfig, RunRequest};
pub use error::{PipelineError, Result};
pub use forecast::{
    capability_for, DecompositionForecaster, EtsForecaster, FittedModel, ForecastCapability,
    ForecastEngine, ForecastPoint, ForecastResult, ModelForecast, ModelKind,
};
pub use period::Granularity;
pub use pipeline::{Pipeline, PipelineOutput, RunSummary};
pub use report::{assemble, FailureRow, ForecastRow, Report, ReportInputs, TrendRow};
pub use rollup::{
    build_groups, rollup, rollup_all, ExcludedMember, ExclusionReason, Group, GroupRollup,
};
pub use schema::{
    fold_header, map_headers, normalize, parse_date, parse_quantity, CanonicalField,
    CanonicalRow, EntityConflict, HeaderMapping, NormalizedBatch, RawBatch, RowIssue,
    SynonymTable,
};
pub use series::{
    Entity, EntitySeries, InsufficientHistory, Observation, SeriesBuilder, SeriesSet, TimeSeries,
};
pub use trend::{TrendAnalyzer, TrendDirection, TrendSignal};
