//! Engine configuration.
//!
//! ```
//! use comb_db::DbConfig;
//!
//! let config = DbConfig::from_json_str(r#"{ "leaf_fanout": 8, "buffered": true }"#).unwrap();
//! assert_eq!(config.leaf_fanout, 8);
//! assert_eq!(config.branch_fanout, 3);
//! assert!(config.buffered);
//! ```

use comb_index::Fanout;
use serde::{Deserialize, Serialize};

use crate::{DbError, Result};

/// Settings applied to every table a [`crate::SwarmDb`] creates or opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DbConfig {
    /// B+tree leaf fanout (`kd`) of newly created tables
    pub leaf_fanout: usize,
    /// B+tree branch fanout (`kx`) of newly created tables
    pub branch_fanout: usize,
    /// Smallest accepted row payload in bytes
    pub min_payload_len: usize,
    /// Whether tables start in buffered mode when opened
    pub buffered: bool,
    /// Default for the encrypted flag of new tables
    pub encrypted: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            leaf_fanout: Fanout::DEFAULT.leaf,
            branch_fanout: Fanout::DEFAULT.branch,
            min_payload_len: 1,
            buffered: false,
            encrypted: false,
        }
    }
}

impl DbConfig {
    /// Parses and validates a JSON configuration; absent fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|err| DbError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`DbConfig::from_json_str`] for raw bytes
    pub fn from_json_slice(json: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(json).map_err(|err| DbError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the B+tree fanouts describe nodes that fit in a chunk
    pub fn validate(&self) -> Result<()> {
        self.fanout().map(|_| ())
    }

    /// The B+tree fanout
    pub fn fanout(&self) -> Result<Fanout> {
        Fanout::new(self.leaf_fanout, self.branch_fanout).map_err(|err| DbError::Config(err.to_string()))
    }
}
