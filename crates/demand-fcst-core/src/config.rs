//! Pipeline configuration.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::forecast::ModelKind;
use crate::period::Granularity;
use crate::schema::SynonymTable;

/// Configuration consumed by [`crate::pipeline::Pipeline`].
///
/// Deserializes with every field optional; missing fields take the values
/// of [`PipelineConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Header synonym table
    pub synonyms: SynonymTable,
    /// Period granularity of series and forecasts
    pub granularity: Granularity,
    /// Minimum distinct periods an entity needs to be forecast
    pub min_history: usize,
    /// Largest horizon a run may request
    pub max_horizon: usize,
    /// Periods of history averaged for the trend signal
    pub lookback_periods: usize,
    /// Keep only rows whose movement type matches (folded comparison)
    pub movement_filter: Option<String>,
    /// Worker threads for fitting (0 = available parallelism)
    pub workers: usize,
    /// Wall-clock limit per entity fit, in milliseconds
    pub fit_timeout_ms: Option<u64>,
    /// Confidence level of the forecast band (0-1)
    pub confidence_level: f64,
    /// Seasonal cycle length; None derives it from the granularity
    pub seasonal_period: Option<usize>,
    /// Forecasting capability
    pub model: ModelKind,
    /// ETS notation, only used when model is `ets`
    pub ets_spec: Option<String>,
    /// Zero-fill missing periods inside each series
    pub fill_gaps: bool,
    /// Absolute delta treated as stable (0 = exact equality)
    pub stable_tolerance: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            synonyms: SynonymTable::default(),
            granularity: Granularity::Month,
            min_history: 2,
            max_horizon: 24,
            lookback_periods: 3,
            movement_filter: None,
            workers: 0,
            fit_timeout_ms: None,
            confidence_level: 0.95,
            seasonal_period: None,
            model: ModelKind::Decomposition,
            ets_spec: None,
            fill_gaps: false,
            stable_tolerance: 0.0,
        }
    }
}

impl PipelineConfig {
    /// Seasonal cycle length in periods.
    pub fn season_length(&self) -> usize {
        self.seasonal_period
            .unwrap_or_else(|| self.granularity.default_season_length())
            .max(1)
    }

    /// Reject values no run could use.
    pub fn validate(&self) -> Result<()> {
        if self.synonyms.is_empty() {
            return Err(PipelineError::invalid_parameter(
                "synonyms",
                "{}",
                "synonym table is empty",
            ));
        }
        if self.min_history == 0 {
            return Err(PipelineError::invalid_parameter(
                "min_history",
                self.min_history,
                "must be at least 1",
            ));
        }
        if self.max_horizon == 0 {
            return Err(PipelineError::invalid_parameter(
                "max_horizon",
                self.max_horizon,
                "must be at least 1",
            ));
        }
        if self.lookback_periods == 0 {
            return Err(PipelineError::invalid_parameter(
                "lookback_periods",
                self.lookback_periods,
                "must be at least 1",
            ));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(PipelineError::invalid_parameter(
                "confidence_level",
                self.confidence_level,
                "must be between 0 and 1",
            ));
        }
        if !(self.stable_tolerance.is_finite() && self.stable_tolerance >= 0.0) {
            return Err(PipelineError::invalid_parameter(
                "stable_tolerance",
                self.stable_tolerance,
                "must be a finite, non-negative number",
            ));
        }
        if self.fit_timeout_ms == Some(0) {
            return Err(PipelineError::invalid_parameter(
                "fit_timeout_ms",
                0,
                "must be positive when set",
            ));
        }
        if self.seasonal_period == Some(0) {
            return Err(PipelineError::invalid_parameter(
                "seasonal_period",
                0,
                "must be positive when set",
            ));
        }
        Ok(())
    }
}

/// Per-run parameters chosen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Number of future periods to forecast
    pub horizon: usize,
    /// Restrict the run to one group
    pub group: Option<String>,
    /// Restrict the run to one entity
    pub entity: Option<String>,
}

impl RunRequest {
    pub fn new(horizon: usize) -> Self {
        Self {
            horizon,
            group: None,
            entity: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.season_length(), 12);
        assert_eq!(config.max_horizon, 24);
        assert_eq!(config.min_history, 2);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"granularity": "quarter", "min_history": 4, "movement_filter": "Saída"}"#,
        )
        .unwrap();
        assert_eq!(config.granularity, Granularity::Quarter);
        assert_eq!(config.min_history, 4);
        assert_eq!(config.movement_filter.as_deref(), Some("Saída"));
        assert_eq!(config.season_length(), 4);
        assert_eq!(config.synonyms, SynonymTable::default());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let parsed: std::result::Result<PipelineConfig, _> =
            serde_json::from_str(r#"{"horizon_max": 3}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            PipelineConfig {
                min_history: 0,
                ..Default::default()
            },
            PipelineConfig {
                max_horizon: 0,
                ..Default::default()
            },
            PipelineConfig {
                lookback_periods: 0,
                ..Default::default()
            },
            PipelineConfig {
                confidence_level: 1.5,
                ..Default::default()
            },
            PipelineConfig {
                stable_tolerance: f64::NAN,
                ..Default::default()
            },
            PipelineConfig {
                fit_timeout_ms: Some(0),
                ..Default::default()
            },
            PipelineConfig {
                synonyms: SynonymTable::empty(),
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(
                    config.validate(),
                    Err(PipelineError::InvalidParameter { .. })
                ),
                "{:?} should be rejected",
                config
            );
        }
    }

    #[test]
    fn test_run_request_builder() {
        let request = RunRequest::new(3).with_group("X").with_entity("A");
        assert_eq!(request.horizon, 3);
        assert_eq!(request.group.as_deref(), Some("X"));
        assert_eq!(request.entity.as_deref(), Some("A"));
    }
}
