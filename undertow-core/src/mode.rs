//! Runtime mode configuration for Undertow.

use serde::{Deserialize, Serialize};

/// Runtime mode for Undertow services.
///
/// Controls whether objects are fetched from the real upstream store or from
/// the in-memory demo store. Both modes expose the same interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuntimeMode {
    /// Production mode - fetches chunks from the configured upstream
    #[default]
    Production,
    /// Demo mode - serves generated objects from the simulated store
    Demo,
}

impl RuntimeMode {
    /// Check if running in demo mode.
    pub fn is_demo(self) -> bool {
        matches!(self, Self::Demo)
    }
}

impl std::fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "PRODUCTION"),
            Self::Demo => write!(f, "DEMO"),
        }
    }
}

impl std::str::FromStr for RuntimeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "demo" => Ok(Self::Demo),
            _ => Err(format!(
                "Invalid runtime mode: '{s}'. Valid options are: production, demo"
            )),
        }
    }
}
