use serde::{Deserialize, Serialize};
use std::path::Path;
use stride_common::Color;

/// Errors from loading or validating an `EngineConfig`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Scheduler configuration. Every field has a default, so a config file only
/// needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed simulation steps per second.
    pub update_hz: f64,
    /// Fixed draw steps per second.
    pub draw_hz: f64,
    /// Longest wall-clock delta fed to the accumulators in one outer
    /// iteration. Anything beyond it is dropped. `None` catches up without
    /// bound.
    pub max_frame_delta: Option<f64>,
    /// Color the graphics subsystem clears to.
    pub clear_color: Color,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update_hz: 120.0,
            draw_hz: 60.0,
            max_frame_delta: Some(0.25),
            clear_color: Color::BLACK,
        }
    }
}

impl EngineConfig {
    pub fn with_rates(update_hz: f64, draw_hz: f64) -> Self {
        Self {
            update_hz,
            draw_hz,
            ..Self::default()
        }
    }

    pub fn with_max_frame_delta(mut self, max_frame_delta: Option<f64>) -> Self {
        self.max_frame_delta = max_frame_delta;
        self
    }

    /// Seconds per Update step.
    pub fn update_period(&self) -> f64 {
        1.0 / self.update_hz
    }

    /// Seconds per Draw step.
    pub fn draw_period(&self) -> f64 {
        1.0 / self.draw_hz
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        tracing::debug!(path = %path.display(), ?config, "loaded engine config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_rate("update_hz", self.update_hz)?;
        check_rate("draw_hz", self.draw_hz)?;
        if let Some(max) = self.max_frame_delta {
            if !(max.is_finite() && max > 0.0) {
                return Err(ConfigError::Invalid {
                    field: "max_frame_delta",
                    reason: format!("must be a positive number of seconds, got {max}"),
                });
            }
        }
        Ok(())
    }
}

fn check_rate(field: &'static str, hz: f64) -> Result<(), ConfigError> {
    if hz.is_finite() && hz > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("must be a positive rate, got {hz}"),
        })
    }
}
