//! Per-entity forecasting.
//!
//! [`ForecastEngine`] owns the horizon contract (bounds, contiguous future
//! periods, band ordering) and delegates the statistics to a swappable
//! [`ForecastCapability`]. Two capabilities ship with the crate:
//! [`DecompositionForecaster`] (default) and [`EtsForecaster`], which wraps
//! the anofox-forecast ETS model.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anofox_forecast::models::exponential::{ETSSpec, ETS as ETSModel};
use anofox_forecast::prelude::Forecaster;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{PipelineError, Result};
use crate::series::{Entity, TimeSeries};

/// Raw output of a fitted model, before it is attached to calendar periods.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelForecast {
    /// Point forecasts
    pub point: Vec<f64>,
    /// Lower bounds
    pub lower: Vec<f64>,
    /// Upper bounds
    pub upper: Vec<f64>,
    /// Model name used
    pub model_name: String,
}

/// A model fitted to one series.
pub trait FittedModel {
    /// Forecast `horizon` steps past the end of the fitted series.
    fn predict(&mut self, horizon: usize) -> Result<ModelForecast>;
}

/// A statistical forecasting method.
///
/// Implementations must be stateless across calls: every `fit` works only on
/// the values it is given, so fits for different entities can run on
/// different threads.
pub trait ForecastCapability: Send + Sync {
    fn name(&self) -> &str;

    /// Fit a model to `values` (oldest first). `season_length` is the
    /// number of periods in one seasonal cycle; 1 means non-seasonal.
    fn fit(&self, values: &[f64], season_length: usize) -> Result<Box<dyn FittedModel>>;
}

/// Available forecasting capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Decomposition,
    Ets,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Decomposition => "decomposition",
            ModelKind::Ets => "ets",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "decomposition" | "stl" | "default" => Ok(ModelKind::Decomposition),
            "ets" | "autoets" | "auto_ets" => Ok(ModelKind::Ets),
            _ => Err(PipelineError::InvalidModel(format!("Unknown model: {}", s))),
        }
    }
}

/// Build the capability for a model kind.
pub fn capability_for(
    kind: ModelKind,
    ets_spec: Option<&str>,
    confidence_level: f64,
) -> Result<Arc<dyn ForecastCapability>> {
    let capability: Arc<dyn ForecastCapability> = match kind {
        ModelKind::Decomposition => Arc::new(DecompositionForecaster::new(confidence_level)?),
        ModelKind::Ets => Arc::new(EtsForecaster::new(ets_spec, confidence_level)?),
    };
    Ok(capability)
}

/// One forecast period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    /// Period start date.
    pub period: NaiveDate,
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Forecast for one entity: exactly `horizon` contiguous periods following
/// the last observed period, in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    pub entity: Entity,
    pub model_name: String,
    pub points: Vec<ForecastPoint>,
}

impl ForecastResult {
    pub fn horizon(&self) -> usize {
        self.points.len()
    }

    /// Sum of the point estimates of the last `periods` entries.
    pub fn tail_total(&self, periods: usize) -> f64 {
        let start = self.points.len().saturating_sub(periods);
        self.points[start..].iter().map(|p| p.point).sum()
    }

    /// Mean point estimate over the whole horizon (0 for an empty result).
    pub fn point_average(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points.iter().map(|p| p.point).sum::<f64>() / self.points.len() as f64
    }
}

/// Fits one model per series and shapes its output into a [`ForecastResult`].
#[derive(Clone)]
pub struct ForecastEngine {
    capability: Arc<dyn ForecastCapability>,
    max_horizon: usize,
    season_length: usize,
}

impl fmt::Debug for ForecastEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForecastEngine")
            .field("capability", &self.capability.name())
            .field("max_horizon", &self.max_horizon)
            .field("season_length", &self.season_length)
            .finish()
    }
}

impl ForecastEngine {
    pub fn new(
        capability: Arc<dyn ForecastCapability>,
        max_horizon: usize,
        season_length: usize,
    ) -> Self {
        Self {
            capability,
            max_horizon,
            season_length: season_length.max(1),
        }
    }

    pub fn capability(&self) -> &Arc<dyn ForecastCapability> {
        &self.capability
    }

    pub fn max_horizon(&self) -> usize {
        self.max_horizon
    }

    /// Check `horizon` against `1..=max_horizon`.
    pub fn validate_horizon(&self, horizon: usize) -> Result<()> {
        if horizon == 0 || horizon > self.max_horizon {
            return Err(PipelineError::InvalidHorizon {
                requested: horizon,
                max: self.max_horizon,
            });
        }
        Ok(())
    }

    /// Forecast `horizon` periods for one entity's series.
    ///
    /// Horizon errors are returned as-is; every other failure is reported as
    /// [`PipelineError::Forecasting`] naming the entity.
    pub fn forecast(
        &self,
        entity: &Entity,
        series: &TimeSeries,
        horizon: usize,
    ) -> Result<ForecastResult> {
        self.validate_horizon(horizon)?;
        self.forecast_unchecked(entity, series, horizon)
            .map_err(|e| e.for_entity(&entity.id))
    }

    fn forecast_unchecked(
        &self,
        entity: &Entity,
        series: &TimeSeries,
        horizon: usize,
    ) -> Result<ForecastResult> {
        let last = series.last_period().ok_or(PipelineError::InsufficientData {
            needed: 1,
            got: 0,
        })?;
        let values = series.values();
        check_finite(&values)?;

        let mut model = self.capability.fit(&values, self.season_length)?;
        let output = model.predict(horizon)?;
        validate_output(&output, horizon)?;

        let granularity = series.granularity();
        let points = (0..horizon)
            .map(|i| ForecastPoint {
                period: granularity.advance(last, i as u32 + 1),
                point: output.point[i],
                lower: output.lower[i],
                upper: output.upper[i],
            })
            .collect();

        Ok(ForecastResult {
            entity: entity.clone(),
            model_name: output.model_name,
            points,
        })
    }
}

fn check_finite(values: &[f64]) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(idx) => Err(PipelineError::ComputationError(format!(
            "non-finite value {} at position {}",
            values[idx], idx
        ))),
        None => Ok(()),
    }
}

fn validate_output(output: &ModelForecast, horizon: usize) -> Result<()> {
    if output.point.len() != horizon
        || output.lower.len() != horizon
        || output.upper.len() != horizon
    {
        return Err(PipelineError::InternalError(format!(
            "{} returned {} points ({} lower, {} upper) for horizon {}",
            output.model_name,
            output.point.len(),
            output.lower.len(),
            output.upper.len(),
            horizon
        )));
    }
    for i in 0..horizon {
        let (lo, p, hi) = (output.lower[i], output.point[i], output.upper[i]);
        if !(lo <= p && p <= hi) {
            return Err(PipelineError::InternalError(format!(
                "{} band violated at step {}: lower {} point {} upper {}",
                output.model_name,
                i + 1,
                lo,
                p,
                hi
            )));
        }
    }
    Ok(())
}

/// Two-sided normal quantile for a confidence level in (0, 1).
fn z_score(confidence_level: f64) -> Result<f64> {
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(PipelineError::invalid_parameter(
            "confidence_level",
            confidence_level,
            "must be between 0 and 1",
        ));
    }
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| PipelineError::InternalError(format!("standard normal: {}", e)))?;
    Ok(normal.inverse_cdf(0.5 + confidence_level / 2.0))
}

/// Symmetric band widening with the square root of the step.
fn symmetric_bands(point: &[f64], sigma: f64, z: f64) -> (Vec<f64>, Vec<f64>) {
    let half = |i: usize| z * sigma * ((i + 1) as f64).sqrt();
    let lower = point.iter().enumerate().map(|(i, &f)| f - half(i)).collect();
    let upper = point.iter().enumerate().map(|(i, &f)| f + half(i)).collect();
    (lower, upper)
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Residual spread: RMS of residuals when there are at least two, otherwise
/// the spread of the series itself.
fn residual_sigma(residuals: &[f64], values: &[f64]) -> f64 {
    if residuals.len() >= 2 {
        (residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64).sqrt()
    } else {
        std_dev(values)
    }
}

/// Seasonal-trend decomposition followed by Holt linear smoothing.
///
/// With at least two full seasons the series is split into trend, seasonal
/// and remainder by a centred moving average; the seasonal profile is
/// repeated over the horizon and the deseasonalised series is extrapolated
/// with Holt's method. Shorter series are treated as non-seasonal.
#[derive(Debug, Clone)]
pub struct DecompositionForecaster {
    alpha: f64,
    beta: f64,
    z: f64,
}

impl DecompositionForecaster {
    pub fn new(confidence_level: f64) -> Result<Self> {
        Ok(Self {
            alpha: 0.3,
            beta: 0.1,
            z: z_score(confidence_level)?,
        })
    }
}

struct DecompositionModel {
    level: f64,
    trend: f64,
    seasonal: Vec<f64>,
    n_obs: usize,
    sigma: f64,
    z: f64,
}

impl ForecastCapability for DecompositionForecaster {
    fn name(&self) -> &str {
        "Decomposition"
    }

    fn fit(&self, values: &[f64], season_length: usize) -> Result<Box<dyn FittedModel>> {
        if values.is_empty() {
            return Err(PipelineError::InsufficientData { needed: 1, got: 0 });
        }
        check_finite(values)?;

        let n = values.len();
        let period = season_length.max(1);
        let (seasonal, deseasonalized) = if period > 1 && n >= 2 * period {
            let (_, seasonal, _) = seasonal_decompose(values, period)?;
            let deseasonalized = values
                .iter()
                .zip(seasonal.iter())
                .map(|(v, s)| v - s)
                .collect::<Vec<_>>();
            let profile = (0..period).map(|phase| seasonal[phase]).collect();
            (profile, deseasonalized)
        } else {
            (Vec::new(), values.to_vec())
        };

        let (level, trend, residuals) = holt_fit(&deseasonalized, self.alpha, self.beta);

        Ok(Box::new(DecompositionModel {
            level,
            trend,
            seasonal,
            n_obs: n,
            sigma: residual_sigma(&residuals, values),
            z: self.z,
        }))
    }
}

impl FittedModel for DecompositionModel {
    fn predict(&mut self, horizon: usize) -> Result<ModelForecast> {
        let point: Vec<f64> = (0..horizon)
            .map(|i| {
                let seasonal = if self.seasonal.is_empty() {
                    0.0
                } else {
                    self.seasonal[(self.n_obs + i) % self.seasonal.len()]
                };
                self.level + self.trend * (i + 1) as f64 + seasonal
            })
            .collect();
        let (lower, upper) = symmetric_bands(&point, self.sigma, self.z);
        Ok(ModelForecast {
            point,
            lower,
            upper,
            model_name: if self.seasonal.is_empty() {
                "Decomposition(trend)".to_string()
            } else {
                format!("Decomposition(trend+season{})", self.seasonal.len())
            },
        })
    }
}

/// Holt linear smoothing; returns final level, final trend and the
/// one-step-ahead in-sample residuals.
fn holt_fit(values: &[f64], alpha: f64, beta: f64) -> (f64, f64, Vec<f64>) {
    let mut level = values[0];
    if values.len() < 2 {
        return (level, 0.0, Vec::new());
    }
    let mut trend = values[1] - values[0];
    let mut residuals = Vec::with_capacity(values.len() - 1);

    for &v in values.iter().skip(1) {
        residuals.push(v - (level + trend));
        let prev_level = level;
        level = alpha * v + (1.0 - alpha) * (level + trend);
        trend = beta * (level - prev_level) + (1.0 - beta) * trend;
    }

    (level, trend, residuals)
}

/// Split a series into trend, seasonal and remainder for one period.
///
/// Trend is a centred moving average extended flat to the edges; the
/// seasonal component is the per-phase mean of the detrended series,
/// centred to zero.
fn seasonal_decompose(values: &[f64], period: usize) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
    if values.len() < 2 * period {
        return Err(PipelineError::InsufficientData {
            needed: 2 * period,
            got: values.len(),
        });
    }

    let n = values.len();
    let window = if period % 2 == 0 { period + 1 } else { period };
    let half_window = window / 2;

    let mut trend = vec![f64::NAN; n];
    for i in half_window..(n - half_window) {
        let sum: f64 = values[i - half_window..=i + half_window].iter().sum();
        trend[i] = sum / window as f64;
    }

    let first_valid = trend.iter().position(|v| !v.is_nan()).unwrap_or(0);
    let last_valid = trend.iter().rposition(|v| !v.is_nan()).unwrap_or(n - 1);
    for i in 0..first_valid {
        trend[i] = trend[first_valid];
    }
    for i in (last_valid + 1)..n {
        trend[i] = trend[last_valid];
    }

    let detrended: Vec<f64> = values.iter().zip(trend.iter()).map(|(v, t)| v - t).collect();

    let mut phase_means = vec![0.0; period];
    for (phase, mean) in phase_means.iter_mut().enumerate() {
        let members: Vec<f64> = detrended.iter().skip(phase).step_by(period).copied().collect();
        *mean = members.iter().sum::<f64>() / members.len() as f64;
    }
    let centre = phase_means.iter().sum::<f64>() / period as f64;
    let seasonal: Vec<f64> = (0..n).map(|i| phase_means[i % period] - centre).collect();

    let remainder = values
        .iter()
        .zip(trend.iter())
        .zip(seasonal.iter())
        .map(|((v, t), s)| v - t - s)
        .collect();

    Ok((trend, seasonal, remainder))
}

/// ETS state-space model from anofox-forecast.
///
/// Without an explicit notation, `AAA` is used when two full seasons are
/// available and `AAN` otherwise.
#[derive(Debug, Clone)]
pub struct EtsForecaster {
    spec: Option<String>,
    z: f64,
}

impl EtsForecaster {
    pub fn new(spec: Option<&str>, confidence_level: f64) -> Result<Self> {
        if let Some(notation) = spec {
            parse_ets_spec(notation)?;
        }
        Ok(Self {
            spec: spec.map(str::to_string),
            z: z_score(confidence_level)?,
        })
    }
}

/// Validate ETS notation: `[E][T][S]` or `[E][T]d[S]`, where E is A or M,
/// T is A, M or N, S is A, M or N.
fn is_valid_ets_notation(notation: &str) -> bool {
    let chars: Vec<char> = notation.chars().collect();
    let error_ok = |c: char| c == 'A' || c == 'M';
    let component_ok = |c: char| c == 'A' || c == 'M' || c == 'N';
    match chars.len() {
        3 => error_ok(chars[0]) && component_ok(chars[1]) && component_ok(chars[2]),
        4 => {
            error_ok(chars[0])
                && (chars[1] == 'A' || chars[1] == 'M')
                && chars[2] == 'd'
                && component_ok(chars[3])
        }
        _ => false,
    }
}

fn parse_ets_spec(notation: &str) -> Result<ETSSpec> {
    if !is_valid_ets_notation(notation) {
        return Err(PipelineError::InvalidModel(format!(
            "Invalid ETS model specification '{}'. Expected notation like 'AAN', 'AAA', 'AAdN'",
            notation
        )));
    }
    let spec = ETSSpec::from_notation(notation).map_err(|e| {
        PipelineError::InvalidModel(format!(
            "Invalid ETS model specification '{}': {}",
            notation, e
        ))
    })?;
    if !spec.is_valid() {
        return Err(PipelineError::InvalidModel(format!(
            "ETS model specification '{}' is unstable",
            notation
        )));
    }
    Ok(spec)
}

struct EtsModel {
    model: ETSModel,
    name: String,
    sigma: f64,
    z: f64,
}

impl ForecastCapability for EtsForecaster {
    fn name(&self) -> &str {
        "ETS"
    }

    fn fit(&self, values: &[f64], season_length: usize) -> Result<Box<dyn FittedModel>> {
        use anofox_forecast::core::TimeSeriesBuilder;

        if values.len() < 3 {
            return Err(PipelineError::InsufficientData {
                needed: 3,
                got: values.len(),
            });
        }
        check_finite(values)?;

        let seasonal_fit = season_length > 1 && values.len() >= 2 * season_length;
        let notation = match &self.spec {
            Some(notation) => notation.as_str(),
            None if seasonal_fit => "AAA",
            None => "AAN",
        };
        let spec = parse_ets_spec(notation)?;
        let period = if spec.has_seasonal() && seasonal_fit {
            season_length
        } else {
            1
        };

        let time_series = TimeSeriesBuilder::new()
            .values(values.to_vec())
            .build()
            .map_err(|e| {
                PipelineError::ComputationError(format!("Failed to build TimeSeries: {}", e))
            })?;

        let mut model = ETSModel::new(spec, period);
        model.fit(&time_series).map_err(|e| {
            PipelineError::ComputationError(format!("Failed to fit ETS model: {}", e))
        })?;

        let residuals: Vec<f64> = model
            .fitted_values()
            .map(|fitted| {
                values
                    .iter()
                    .zip(fitted.iter())
                    .map(|(a, f)| a - f)
                    .filter(|r| r.is_finite())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Box::new(EtsModel {
            model,
            name: format!("ETS({})", spec.short_name()),
            sigma: residual_sigma(&residuals, values),
            z: self.z,
        }))
    }
}

impl FittedModel for EtsModel {
    fn predict(&mut self, horizon: usize) -> Result<ModelForecast> {
        let forecast = self.model.predict(horizon).map_err(|e| {
            PipelineError::ComputationError(format!("Failed to generate ETS forecasts: {}", e))
        })?;
        let point = forecast.point().first().cloned().unwrap_or_default();
        check_finite(&point)?;
        let (lower, upper) = symmetric_bands(&point, self.sigma, self.z);
        Ok(ModelForecast {
            point,
            lower,
            upper,
            model_name: self.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Granularity;
    use approx::assert_relative_eq;

    fn entity() -> Entity {
        Entity {
            id: "A".into(),
            name: "Item A".into(),
            group_id: "X".into(),
        }
    }

    fn monthly(values: &[f64]) -> TimeSeries {
        TimeSeries::from_points(
            Granularity::Month,
            values.iter().enumerate().map(|(i, &v)| {
                let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
                (Granularity::Month.advance(start, i as u32), v)
            }),
        )
    }

    fn engine() -> ForecastEngine {
        ForecastEngine::new(
            Arc::new(DecompositionForecaster::new(0.95).unwrap()),
            24,
            12,
        )
    }

    #[test]
    fn test_horizon_three_on_twelve_points() {
        let values: Vec<f64> = (0..12).map(|i| 10.0 + i as f64).collect();
        let result = engine().forecast(&entity(), &monthly(&values), 3).unwrap();

        assert_eq!(result.horizon(), 3);
        let periods: Vec<NaiveDate> = result.points.iter().map(|p| p.period).collect();
        assert_eq!(
            periods,
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            ]
        );
        for p in &result.points {
            assert!(p.lower <= p.point && p.point <= p.upper);
        }
    }

    #[test]
    fn test_linear_series_is_extrapolated() {
        let values: Vec<f64> = (0..12).map(|i| 10.0 + 2.0 * i as f64).collect();
        let result = engine().forecast(&entity(), &monthly(&values), 2).unwrap();
        assert_relative_eq!(result.points[0].point, 34.0, epsilon = 1e-9);
        assert_relative_eq!(result.points[1].point, 36.0, epsilon = 1e-9);
    }

    #[test]
    fn test_horizon_bounds() {
        let series = monthly(&[1.0, 2.0, 3.0]);
        for bad in [0usize, 25] {
            assert_eq!(
                engine().forecast(&entity(), &series, bad).unwrap_err(),
                PipelineError::InvalidHorizon {
                    requested: bad,
                    max: 24
                }
            );
        }
        assert!(engine().forecast(&entity(), &series, 24).is_ok());
    }

    #[test]
    fn test_constant_and_zero_series_are_legal() {
        for v in [0.0, 7.0] {
            let result = engine().forecast(&entity(), &monthly(&[v; 6]), 4).unwrap();
            for p in &result.points {
                assert_relative_eq!(p.point, v, epsilon = 1e-12);
                assert_relative_eq!(p.lower, v, epsilon = 1e-12);
                assert_relative_eq!(p.upper, v, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_two_point_series_forecasts() {
        let result = engine().forecast(&entity(), &monthly(&[15.0, 12.0]), 3).unwrap();
        assert_eq!(result.horizon(), 3);
        assert!(result.points.iter().all(|p| p.lower <= p.point && p.point <= p.upper));
    }

    #[test]
    fn test_seasonal_pattern_is_repeated() {
        let values: Vec<f64> = (0..36)
            .map(|i| 100.0 + if i % 12 == 11 { 50.0 } else { 0.0 })
            .collect();
        let result = engine().forecast(&entity(), &monthly(&values), 12).unwrap();
        assert!(result.model_name.contains("season12"));
        let december = result.points[11].point;
        let others = result.points[..11].iter().map(|p| p.point);
        assert!(others.into_iter().all(|p| p < december));
    }

    #[test]
    fn test_non_finite_values_fail_with_entity_name() {
        let err = engine()
            .forecast(&entity(), &monthly(&[1.0, f64::NAN, 3.0]), 2)
            .unwrap_err();
        match err {
            PipelineError::Forecasting { entity, reason } => {
                assert_eq!(entity, "A");
                assert!(reason.contains("non-finite"));
            }
            other => panic!("expected forecasting error, got {:?}", other),
        }
    }

    struct BrokenCapability;
    struct BrokenModel;

    impl FittedModel for BrokenModel {
        fn predict(&mut self, horizon: usize) -> Result<ModelForecast> {
            Ok(ModelForecast {
                point: vec![1.0; horizon],
                lower: vec![2.0; horizon],
                upper: vec![3.0; horizon],
                model_name: "Broken".into(),
            })
        }
    }

    impl ForecastCapability for BrokenCapability {
        fn name(&self) -> &str {
            "Broken"
        }
        fn fit(&self, _values: &[f64], _season_length: usize) -> Result<Box<dyn FittedModel>> {
            Ok(Box::new(BrokenModel))
        }
    }

    #[test]
    fn test_band_violation_is_detected() {
        let output = BrokenModel.predict(2).unwrap();
        let err = validate_output(&output, 2);
        assert!(matches!(err, Err(PipelineError::InternalError(_))));
    }

    #[test]
    fn test_short_output_is_rejected() {
        let output = ModelForecast {
            point: vec![1.0],
            lower: vec![0.0],
            upper: vec![2.0],
            model_name: "Short".into(),
        };
        assert!(validate_output(&output, 2).is_err());
    }

    #[test]
    fn test_broken_capability_is_swappable() {
        let engine = ForecastEngine::new(Arc::new(BrokenCapability), 24, 12);
        assert_eq!(engine.capability().name(), "Broken");
    }

    #[test]
    fn test_seasonal_decompose_centres_seasonal_component() {
        let values: Vec<f64> = (0..24).map(|i| (i % 4) as f64 * 3.0 + i as f64).collect();
        let (trend, seasonal, remainder) = seasonal_decompose(&values, 4).unwrap();
        assert_eq!(trend.len(), 24);
        assert_relative_eq!(seasonal[..4].iter().sum::<f64>(), 0.0, epsilon = 1e-9);
        for i in 0..24 {
            assert_relative_eq!(trend[i] + seasonal[i] + remainder[i], values[i], epsilon = 1e-9);
        }
        assert!(seasonal_decompose(&values[..6], 4).is_err());
    }

    #[test]
    fn test_z_score() {
        assert_relative_eq!(z_score(0.95).unwrap(), 1.959964, epsilon = 1e-5);
        assert!(z_score(1.0).is_err());
        assert!(z_score(0.0).is_err());
    }

    #[test]
    fn test_model_kind_from_str() {
        assert_eq!("STL".parse::<ModelKind>().unwrap(), ModelKind::Decomposition);
        assert_eq!("ets".parse::<ModelKind>().unwrap(), ModelKind::Ets);
        assert!(matches!(
            "prophet".parse::<ModelKind>(),
            Err(PipelineError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_ets_notation_validation() {
        assert!(is_valid_ets_notation("AAN"));
        assert!(is_valid_ets_notation("AAdA"));
        assert!(!is_valid_ets_notation("XYZ"));
        assert!(!is_valid_ets_notation("AA"));
        assert!(EtsForecaster::new(Some("QQQ"), 0.95).is_err());
    }

    #[test]
    fn test_tail_total_and_average() {
        let result = ForecastResult {
            entity: entity(),
            model_name: "m".into(),
            points: [1.0, 2.0, 3.0]
                .iter()
                .map(|&v| ForecastPoint {
                    period: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    point: v,
                    lower: v,
                    upper: v,
                })
                .collect(),
        };
        assert_relative_eq!(result.tail_total(2), 5.0);
        assert_relative_eq!(result.tail_total(10), 6.0);
        assert_relative_eq!(result.point_average(), 2.0);
    }
}
