//! Engine budgets.

use serde::{Deserialize, Serialize};

/// Budgets handed to the generation engine on every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Maximum number of engine steps (tool round trips) per generation.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Automatic retries inside the engine. Retrying is the engine's concern;
    /// this layer never retries.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Output token budget per generation.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_max_steps() -> u32 {
    100
}

fn default_max_retries() -> u32 {
    0
}

fn default_max_output_tokens() -> u32 {
    64_000
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_retries: default_max_retries(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: DriverConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_steps, 100);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.max_output_tokens, 64_000);
    }
}
