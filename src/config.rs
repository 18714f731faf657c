/// Kernel configuration.
///
/// Every field has a default, so a JSON document only needs the keys it
/// overrides:
///
/// ```json
/// { "precision": 1e-6, "network": { "update": "full", "tcp_gamma": 65536 } }
/// ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};

/// How a model keeps its actions' progress up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Completion dates live in a min-heap; only re-solved actions are touched.
    #[default]
    Lazy,
    /// Every running action is advanced every step.
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    pub update: UpdateMode,
}

impl Default for CpuConfig {
    fn default() -> Self {
        CpuConfig {
            update: UpdateMode::Lazy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub update: UpdateMode,
    /// Multiplier applied to the summed latency of a route.
    pub latency_factor: f64,
    /// Multiplier applied to each link's bandwidth.
    pub bandwidth_factor: f64,
    /// TCP window size; bounds a flow of latency `L` to `gamma / (2 L)`.
    pub tcp_gamma: Option<f64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            update: UpdateMode::Lazy,
            latency_factor: 1.0,
            bandwidth_factor: 1.0,
            tcp_gamma: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub update: UpdateMode,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            update: UpdateMode::Full,
        }
    }
}

/// Parallel tasks: actions spanning resources of several classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PtaskConfig {
    pub update: UpdateMode,
}

impl Default for PtaskConfig {
    fn default() -> Self {
        PtaskConfig {
            update: UpdateMode::Full,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Tolerance on dates and remaining amounts.
    pub precision: f64,
    /// Tolerance of the sharing solver.
    pub maxmin_precision: f64,
    pub cpu: CpuConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub ptask: PtaskConfig,
}

impl KernelConfig {
    /// Defaults: lazy cpu and network, full-scan storage and parallel tasks.
    pub fn new() -> Self {
        KernelConfig {
            precision: 1e-5,
            maxmin_precision: 1e-5,
            cpu: CpuConfig::default(),
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
            ptask: PtaskConfig::default(),
        }
    }

    /// Every model in lazy mode.
    pub fn lazy() -> Self {
        Self::new().with_update(UpdateMode::Lazy)
    }

    /// Every model in full-scan mode.
    pub fn full() -> Self {
        Self::new().with_update(UpdateMode::Full)
    }

    /// Set the same update mode on every model.
    pub fn with_update(mut self, mode: UpdateMode) -> Self {
        self.cpu.update = mode;
        self.network.update = mode;
        self.storage.update = mode;
        self.ptask.update = mode;
        self
    }

    pub fn from_json_str(json: &str) -> KernelResult<Self> {
        let config: KernelConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> KernelResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject tolerances and factors that would make the solver meaningless.
    pub fn validate(&self) -> KernelResult<()> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(KernelError::InvalidConfig(format!("{} must be positive, got {}", name, v)))
            }
        };
        positive("precision", self.precision)?;
        positive("maxmin_precision", self.maxmin_precision)?;
        positive("network.latency_factor", self.network.latency_factor)?;
        positive("network.bandwidth_factor", self.network.bandwidth_factor)?;
        if let Some(gamma) = self.network.tcp_gamma {
            positive("network.tcp_gamma", gamma)?;
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = KernelConfig::default();
        assert_eq!(c.precision, 1e-5);
        assert_eq!(c.cpu.update, UpdateMode::Lazy);
        assert_eq!(c.network.update, UpdateMode::Lazy);
        assert_eq!(c.storage.update, UpdateMode::Full);
        assert_eq!(c.ptask.update, UpdateMode::Full);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let c = KernelConfig::from_json_str(
            r#"{ "precision": 1e-6, "network": { "update": "full", "tcp_gamma": 65536 } }"#,
        )
        .unwrap();
        assert_eq!(c.precision, 1e-6);
        assert_eq!(c.maxmin_precision, 1e-5);
        assert_eq!(c.network.update, UpdateMode::Full);
        assert_eq!(c.network.tcp_gamma, Some(65536.0));
        assert_eq!(c.network.latency_factor, 1.0);
        assert_eq!(c.cpu.update, UpdateMode::Lazy);
    }

    #[test]
    fn test_rejects_bad_precision() {
        let err = KernelConfig::from_json_str(r#"{ "precision": 0 }"#).unwrap_err();
        assert!(matches!(err, KernelError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = KernelConfig::from_json_str("{ precision").unwrap_err();
        assert!(matches!(err, KernelError::Json(_)));
    }

    #[test]
    fn test_with_update() {
        let c = KernelConfig::full();
        assert_eq!(c.cpu.update, UpdateMode::Full);
        assert_eq!(c.storage.update, UpdateMode::Full);
        let c = KernelConfig::lazy();
        assert_eq!(c.storage.update, UpdateMode::Lazy);
        assert_eq!(c.ptask.update, UpdateMode::Lazy);
    }

    #[test]
    fn test_json_roundtrip_keeps_modes() {
        let c = KernelConfig::full();
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(KernelConfig::from_json_str(&json).unwrap(), c);
    }
}
