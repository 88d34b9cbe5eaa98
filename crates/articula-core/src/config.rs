use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_true() -> bool {
    true
}
const fn default_min_direction_length() -> f32 {
    1e-6
}
const fn default_min_length() -> f32 {
    1e-6
}

// ---------------------------------------------------------------------------
// TreeConfig
// ---------------------------------------------------------------------------

/// Authoring behaviour of a [`NodeTree`](crate::tree::NodeTree).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Search the destination tree for a colliding guid on every insert and
    /// log a warning when one is found. The search is linear in tree size.
    #[serde(default = "default_true")]
    pub warn_duplicate_guids: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            warn_duplicate_guids: default_true(),
        }
    }
}

// ---------------------------------------------------------------------------
// UpdateConfig
// ---------------------------------------------------------------------------

/// Parameters of the per-chain effector target update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Directions shorter than this cannot be normalized; nlerp is skipped
    /// and the lerped target is kept.
    #[serde(default = "default_min_direction_length")]
    pub min_direction_length: f32,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            min_direction_length: default_min_direction_length(),
        }
    }
}

// ---------------------------------------------------------------------------
// TwoBoneConfig
// ---------------------------------------------------------------------------

/// Tolerances of the analytic two-bone solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoBoneConfig {
    /// Bones, targets and bend axes shorter than this count as zero length.
    #[serde(default = "default_min_length")]
    pub min_length: f32,
}

impl Default for TwoBoneConfig {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
        }
    }
}

// ---------------------------------------------------------------------------
// IkConfig
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IkConfig {
    #[serde(default)]
    pub tree: TreeConfig,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub two_bone: TwoBoneConfig,
}

impl IkConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lengths = [
            ("update.min_direction_length", self.update.min_direction_length),
            ("two_bone.min_length", self.two_bone.min_length),
        ];
        for (field, len) in lengths {
            if !len.is_finite() || len < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    message: format!("{len} is not a finite, non-negative length"),
                });
            }
        }
        Ok(())
    }

    /// Parse and validate from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
