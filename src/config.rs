use serde::{Deserialize, Serialize};

/// Store-level settings, the equivalent of connection pragmas.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enforce FOREIGN KEY constraints on writes. Off by default.
    pub foreign_keys: bool,
}

impl Config {
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }
}
