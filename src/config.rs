//! Render configuration and per-frame feature flags
//!
//! `SharedConfig` replaces a "configuration changed" broadcast with a version
//! counter. Interested components keep a `ConfigWatcher` and poll it once per
//! frame.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::constants::{gpu_driven, probes, shaders};
use crate::error::{EngineError, EngineResult};

/// User-facing renderer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub frustum_culling: bool,
    pub gpu_culling: bool,
    pub gpu_culling_threshold: usize,
    pub wireframe: bool,
    pub debug_overlay: bool,
    pub probe_budget: usize,
    pub reload_timeout_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frustum_culling: true,
            gpu_culling: false,
            gpu_culling_threshold: gpu_driven::DEFAULT_GPU_CULLING_THRESHOLD,
            wireframe: false,
            debug_overlay: false,
            probe_budget: probes::DEFAULT_FRAME_BUDGET,
            reload_timeout_ms: shaders::RELOAD_TIMEOUT_MS,
        }
    }
}

impl RenderConfig {
    /// Parse a TOML document; missing keys fall back to defaults
    pub fn from_toml_str(source: &str) -> EngineResult<Self> {
        toml::from_str(source).map_err(|e| EngineError::ConfigParse {
            path: "<inline>".to_string(),
            error: e.to_string(),
        })
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| EngineError::IoError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        toml::from_str(&source).map_err(|e| EngineError::ConfigParse {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Flags consumed by the frame pipeline
    pub fn feature_flags(&self) -> FeatureFlags {
        FeatureFlags {
            frustum_culling: self.frustum_culling,
            gpu_culling: self.gpu_culling,
            gpu_culling_threshold: self.gpu_culling_threshold,
            wireframe: self.wireframe,
            debug_overlay: self.debug_overlay,
        }
    }
}

/// Feature flags sampled once per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub frustum_culling: bool,
    pub gpu_culling: bool,
    pub gpu_culling_threshold: usize,
    pub wireframe: bool,
    pub debug_overlay: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        RenderConfig::default().feature_flags()
    }
}

impl FeatureFlags {
    /// Whether a group of `batch_count` batches goes through the GPU culling
    /// path. Without frustum culling every batch is emitted on the CPU.
    pub fn use_gpu_culling(&self, batch_count: usize) -> bool {
        self.gpu_culling && self.frustum_culling && batch_count >= self.gpu_culling_threshold
    }
}

struct SharedConfigInner {
    config: RwLock<RenderConfig>,
    version: AtomicU64,
}

/// Config shared between the simulation, render thread and tools
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<SharedConfigInner>,
}

impl SharedConfig {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            inner: Arc::new(SharedConfigInner {
                config: RwLock::new(config),
                version: AtomicU64::new(1),
            }),
        }
    }

    /// Monotonic version, bumped on every update
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> RenderConfig {
        self.inner.config.read().clone()
    }

    pub fn feature_flags(&self) -> FeatureFlags {
        self.inner.config.read().feature_flags()
    }

    /// Mutate the config in place and publish a new version
    pub fn update(&self, f: impl FnOnce(&mut RenderConfig)) {
        let mut config = self.inner.config.write();
        f(&mut config);
        let version = self.inner.version.fetch_add(1, Ordering::AcqRel) + 1;
        log::debug!("[SharedConfig] Config updated to version {}", version);
    }

    pub fn replace(&self, config: RenderConfig) {
        self.update(|current| *current = config);
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}

/// Tracks the last config version a component has applied
#[derive(Debug, Default)]
pub struct ConfigWatcher {
    seen: u64,
}

impl ConfigWatcher {
    pub fn new() -> Self {
        Self { seen: 0 }
    }

    /// Returns the new config if it changed since the last poll
    pub fn poll(&mut self, shared: &SharedConfig) -> Option<RenderConfig> {
        let version = shared.version();
        if version == self.seen {
            return None;
        }
        self.seen = version;
        Some(shared.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RenderConfig::from_toml_str("wireframe = true\nprobe_budget = 5\n").unwrap();
        assert!(config.wireframe);
        assert_eq!(config.probe_budget, 5);
        assert!(config.frustum_culling);
        assert_eq!(config.reload_timeout_ms, shaders::RELOAD_TIMEOUT_MS);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "gpu_culling = true").unwrap();
        writeln!(file, "gpu_culling_threshold = 10").unwrap();

        let config = RenderConfig::load(file.path()).unwrap();
        let flags = config.feature_flags();
        assert!(flags.use_gpu_culling(10));
        assert!(!flags.use_gpu_culling(9));
    }

    #[test]
    fn test_gpu_culling_needs_frustum_culling() {
        let config = RenderConfig::from_toml_str(
            "gpu_culling = true\ngpu_culling_threshold = 1\nfrustum_culling = false\n",
        )
        .unwrap();
        let flags = config.feature_flags();
        assert!(!flags.use_gpu_culling(100));

        let flags = FeatureFlags {
            frustum_culling: true,
            ..flags
        };
        assert!(flags.use_gpu_culling(100));
        assert!(!flags.use_gpu_culling(0));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "wireframe = \"yes please\"").unwrap();

        match RenderConfig::load(file.path()) {
            Err(EngineError::ConfigParse { .. }) => {}
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_watcher_sees_each_version_once() {
        let shared = SharedConfig::default();
        let mut watcher = ConfigWatcher::new();

        assert!(watcher.poll(&shared).is_some());
        assert!(watcher.poll(&shared).is_none());

        shared.update(|c| c.wireframe = true);
        let changed = watcher.poll(&shared).unwrap();
        assert!(changed.wireframe);
        assert!(watcher.poll(&shared).is_none());
    }
}
