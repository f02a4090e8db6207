//! Pipeline configuration from a JSON file plus command-line overrides.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use demand_fcst_core::{Granularity, ModelKind, PipelineConfig};
use tracing::debug;

/// Load a config file, or the defaults when no path is given.
///
/// Fields missing from the file keep their default values.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    let config: PipelineConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
    debug!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Values given on the command line; each one that is set replaces the
/// corresponding config field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub granularity: Option<Granularity>,
    pub min_history: Option<usize>,
    pub max_horizon: Option<usize>,
    pub movement_filter: Option<String>,
    pub workers: Option<usize>,
    pub fit_timeout_ms: Option<u64>,
    pub model: Option<ModelKind>,
    pub ets_spec: Option<String>,
}

impl Overrides {
    pub fn apply(self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(granularity) = self.granularity {
            config.granularity = granularity;
        }
        if let Some(min_history) = self.min_history {
            config.min_history = min_history;
        }
        if let Some(max_horizon) = self.max_horizon {
            config.max_horizon = max_horizon;
        }
        if self.movement_filter.is_some() {
            config.movement_filter = self.movement_filter;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.fit_timeout_ms.is_some() {
            config.fit_timeout_ms = self.fit_timeout_ms;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if self.ets_spec.is_some() {
            config.ets_spec = self.ets_spec;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_path_gives_defaults() {
        assert_eq!(load_config(None).unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_overrides_replace_only_set_fields() {
        let base = PipelineConfig {
            movement_filter: Some("saida".into()),
            workers: 2,
            ..Default::default()
        };
        let config = Overrides {
            min_history: Some(6),
            model: Some(ModelKind::Ets),
            ..Default::default()
        }
        .apply(base);
        assert_eq!(config.min_history, 6);
        assert_eq!(config.model, ModelKind::Ets);
        assert_eq!(config.movement_filter.as_deref(), Some("saida"));
        assert_eq!(config.workers, 2);
    }
}
