use serde::{Deserialize, Serialize};

use crate::env;

/// Which descriptor variant of a loaded program the executor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramVariant {
    #[default]
    Origin,
    Optimized,
}

/// When operator instances are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instantiation {
    /// Every block is instantiated when the executor is created.
    #[default]
    Eager,
    /// A block is instantiated on its first run, before any of its operators executes.
    Lazy,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub variant: ProgramVariant,
    #[serde(default)]
    pub instantiate: Instantiation,
}

impl ExecutorConfig {
    pub fn with_variant(mut self, variant: ProgramVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_instantiation(mut self, instantiate: Instantiation) -> Self {
        self.instantiate = instantiate;
        self
    }

    /// Applies `MGRAPH_OPTIMIZE` / `MGRAPH_LAZY` when they are set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(optimize) = env::optimize_override() {
            self.variant = if optimize {
                ProgramVariant::Optimized
            } else {
                ProgramVariant::Origin
            };
        }
        if let Some(lazy) = env::lazy_override() {
            self.instantiate = if lazy {
                Instantiation::Lazy
            } else {
                Instantiation::Eager
            };
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let cfg: ExecutorConfig = serde_json::from_str(r#"{"variant": "optimized"}"#).unwrap();
        assert_eq!(cfg.variant, ProgramVariant::Optimized);
        assert_eq!(cfg.instantiate, Instantiation::Eager);
    }
}
