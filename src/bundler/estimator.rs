//! Module size estimation
//!
//! The partitioner never reads `Module::size` directly; it asks a
//! [`SizeEstimator`] so that alternate cost models can be plugged in.

use super::graph::{Module, ModuleType};

/// Assigns a byte weight to a module
///
/// Implementations must be deterministic and free of side effects so that
/// repeated builds over the same graph produce the same plan.
pub trait SizeEstimator: Send + Sync {
    /// Estimator name for logging
    fn name(&self) -> &str;

    /// Weight of a single module
    fn estimate(&self, module: &Module) -> u64;
}

/// Uses the declared byte size unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredSize;

impl SizeEstimator for DeclaredSize {
    fn name(&self) -> &str {
        "declared"
    }

    fn estimate(&self, module: &Module) -> u64 {
        module.size
    }
}

/// Scales declared sizes by module type, approximating parse cost
#[derive(Debug, Clone, Copy)]
pub struct WeightedSize {
    pub script: f64,
    pub style: f64,
    pub asset: f64,
    pub other: f64,
    /// Extra factor applied on top for vendor modules
    pub vendor: f64,
}

impl Default for WeightedSize {
    fn default() -> Self {
        Self {
            script: 1.0,
            style: 1.0,
            asset: 1.0,
            other: 1.0,
            vendor: 1.0,
        }
    }
}

impl WeightedSize {
    fn type_factor(&self, module_type: ModuleType) -> f64 {
        match module_type {
            t if t.is_js_like() => self.script,
            ModuleType::Css => self.style,
            ModuleType::Image => self.asset,
            _ => self.other,
        }
    }
}

impl SizeEstimator for WeightedSize {
    fn name(&self) -> &str {
        "weighted"
    }

    fn estimate(&self, module: &Module) -> u64 {
        let mut factor = self.type_factor(module.module_type);
        if module.is_vendor {
            factor *= self.vendor;
        }

        let weighted = (module.size as f64 * factor.max(0.0)).round();
        if weighted >= u64::MAX as f64 {
            u64::MAX
        } else {
            weighted as u64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::graph::{ModuleGraph, ModuleSpec};

    fn module(id: &str, size: u64) -> Module {
        let mut graph = ModuleGraph::new();
        graph
            .add_module_spec(ModuleSpec {
                id: id.to_string(),
                size,
                ..Default::default()
            })
            .unwrap();
        graph.finalize().unwrap().module(0).clone()
    }

    #[test]
    fn test_declared_size() {
        assert_eq!(DeclaredSize.estimate(&module("src/a.js", 1234)), 1234);
        assert_eq!(DeclaredSize.estimate(&module("src/empty.js", 0)), 0);
    }

    #[test]
    fn test_weighted_size() {
        let estimator = WeightedSize {
            script: 2.0,
            style: 0.5,
            vendor: 1.5,
            ..Default::default()
        };

        assert_eq!(estimator.estimate(&module("src/a.js", 100)), 200);
        assert_eq!(estimator.estimate(&module("src/a.css", 100)), 50);
        assert_eq!(estimator.estimate(&module("img/a.png", 100)), 100);
        assert_eq!(
            estimator.estimate(&module("node_modules/x/index.js", 100)),
            300
        );
    }

    #[test]
    fn test_weighted_size_is_deterministic() {
        let estimator = WeightedSize {
            script: 1.37,
            ..Default::default()
        };
        let m = module("src/a.js", 9999);
        assert_eq!(estimator.estimate(&m), estimator.estimate(&m));
    }
}
