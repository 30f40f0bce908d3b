use serde::{Deserialize, Serialize};

use super::filter::VendorFilter;

/// Fixed compiler/JIT flags applied by every backend that compiles source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub max_registers: u32,
    pub optimization_level: u32, // 0..=4, CUDA JIT scale
    pub fast_math: bool,
    /// e.g. "compute_75"; `None` lets the compiler pick its default target.
    pub cuda_arch: Option<String>,
    pub extra_options: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_registers: 64,
            optimization_level: 4,
            fast_math: true,
            cuda_arch: None,
            extra_options: Vec::new(),
        }
    }
}

impl BuildConfig {
    /// Options passed to `clBuildProgram`.
    pub fn opencl_options(&self) -> String {
        let mut opts = Vec::new();
        if self.fast_math {
            opts.push("-cl-fast-relaxed-math".to_string());
        }
        if self.optimization_level == 0 {
            opts.push("-cl-opt-disable".to_string());
        }
        opts.extend(self.extra_options.iter().cloned());
        opts.join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub filter: VendorFilter,
    pub build: BuildConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opencl_options() {
        let cfg = BuildConfig::default();
        assert_eq!(cfg.opencl_options(), "-cl-fast-relaxed-math");

        let cfg = BuildConfig {
            fast_math: false,
            optimization_level: 0,
            extra_options: vec!["-DN=4".into()],
            ..Default::default()
        };
        assert_eq!(cfg.opencl_options(), "-cl-opt-disable -DN=4");
    }
}
