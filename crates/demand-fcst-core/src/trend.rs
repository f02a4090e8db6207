//! Trend classification: recent actuals versus forecast.

use std::fmt;

use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::forecast::ForecastResult;
use crate::series::TimeSeries;

/// Direction of the forecast relative to recent history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    pub fn label(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Trend signal for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendSignal {
    pub direction: TrendDirection,
    /// `forecast_average - recent_average`
    pub delta: f64,
    /// Mean quantity over the lookback window
    pub recent_average: f64,
    /// Mean point estimate over the horizon
    pub forecast_average: f64,
    /// `delta / |recent_average|`, absent when the recent average is zero
    pub relative_change: Option<f64>,
}

/// Compares the tail of a series with its forecast.
///
/// With the default tolerance of 0 a signal is stable only when the two
/// averages are exactly equal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendAnalyzer {
    lookback_periods: usize,
    stable_tolerance: f64,
}

impl TrendAnalyzer {
    pub fn new(lookback_periods: usize) -> Result<Self> {
        if lookback_periods == 0 {
            return Err(PipelineError::invalid_parameter(
                "lookback_periods",
                lookback_periods,
                "must be at least 1",
            ));
        }
        Ok(Self {
            lookback_periods,
            stable_tolerance: 0.0,
        })
    }

    /// Treat `|delta| <= tolerance` as stable.
    pub fn with_stable_tolerance(mut self, tolerance: f64) -> Result<Self> {
        if !(tolerance.is_finite() && tolerance >= 0.0) {
            return Err(PipelineError::invalid_parameter(
                "stable_tolerance",
                tolerance,
                "must be a finite, non-negative number",
            ));
        }
        self.stable_tolerance = tolerance;
        Ok(self)
    }

    /// Classify the forecast against the last `lookback_periods` of history.
    ///
    /// Shorter series use every period they have; an empty series counts as
    /// a recent average of 0.
    pub fn analyze(&self, series: &TimeSeries, forecast: &ForecastResult) -> TrendSignal {
        let tail = series.tail(self.lookback_periods);
        let recent_average = if tail.is_empty() {
            0.0
        } else {
            tail.iter().map(|o| o.quantity).sum::<f64>() / tail.len() as f64
        };
        let forecast_average = forecast.point_average();
        let delta = forecast_average - recent_average;

        let direction = if delta.abs() <= self.stable_tolerance {
            TrendDirection::Stable
        } else if delta > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        };

        let relative_change = if recent_average != 0.0 {
            Some(delta / recent_average.abs())
        } else {
            None
        };

        TrendSignal {
            direction,
            delta,
            recent_average,
            forecast_average,
            relative_change,
        }
    }
}
