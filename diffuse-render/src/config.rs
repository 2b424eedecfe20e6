//! Scheduler configuration.

use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Diffusion scheduler configuration.
///
/// Every field is optional in JSON; missing fields take the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffusionConfig {
    /// Simulation width in texels. Default: 512.
    pub width: u32,
    /// Simulation height in texels. Default: 512.
    pub height: u32,
    /// Diffusion passes per frame. Default: 32.
    pub passes: u32,
    /// Full-screen quad attribute, shared by all three programs.
    pub vertex_attribute: String,
    /// Sampler the diffusion program reads the previous pass from.
    pub source_uniform: String,
    /// Sampler the present program reads the result from.
    pub present_uniform: String,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            passes: 32,
            vertex_attribute: "a_vertex".to_string(),
            source_uniform: "u_source".to_string(),
            present_uniform: "u_texture".to_string(),
        }
    }
}

impl DiffusionConfig {
    /// Small grid and few passes, for tests.
    pub fn for_testing() -> Self {
        Self {
            width: 8,
            height: 8,
            passes: 3,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, RenderError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let path = path.as_ref();
        debug!("loading config from '{}'", path.display());
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::Config(format!(
                "simulation size {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.passes == 0 {
            return Err(RenderError::Config("passes must be at least 1".into()));
        }
        for (field, value) in [
            ("vertex_attribute", &self.vertex_attribute),
            ("source_uniform", &self.source_uniform),
            ("present_uniform", &self.present_uniform),
        ] {
            if value.trim().is_empty() {
                return Err(RenderError::Config(format!("{field} is empty")));
            }
        }
        Ok(())
    }
}

// ===================================================================
// Tests
// ===================================================================
