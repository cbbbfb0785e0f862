// Context configuration persistence
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::compat::{check_slots, ShaderKind};
use crate::error::{FimgError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Vertex program cache entries.
    pub vertex_shader_slots: usize,
    /// Pixel program cache entries.
    pub pixel_shader_slots: usize,
    /// Register queue depth between flushes.
    pub register_queue_capacity: usize,
    /// Bound on hardware lock acquisition.
    pub lock_timeout_ms: u64,
    /// Bound on pipeline drain waits.
    pub pipeline_timeout_ms: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            vertex_shader_slots: 4,
            pixel_shader_slots: 8,
            register_queue_capacity: 64,
            lock_timeout_ms: 1000,
            pipeline_timeout_ms: 1000,
        }
    }
}

impl ContextConfig {
    /// Read a JSON configuration. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: ContextConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values no context can run with.
    pub fn validate(&self) -> Result<()> {
        check_slots(ShaderKind::Vertex, self.vertex_shader_slots)?;
        check_slots(ShaderKind::Pixel, self.pixel_shader_slots)?;
        if self.register_queue_capacity == 0 {
            return Err(FimgError::InvalidConfig(
                "register queue capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_millis(self.pipeline_timeout_ms)
    }
}
