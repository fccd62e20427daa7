//! Engine configuration.
//!
//! Loaded from JSON (all fields optional):
//!
//! ```json
//! {
//!   "extra_significant_properties": ["LOCATION", "SUMMARY"],
//!   "expansion_limit": 1000,
//!   "product_id": "-//Example//Calendar//EN"
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tracking::SignificantProperties;

/// Default cap on instances produced by a single RRULE per expansion.
pub const DEFAULT_EXPANSION_LIMIT: u16 = 1000;

/// PRODID written into documents created by the engine.
pub const DEFAULT_PRODUCT_ID: &str = "-//temporal-cortex//recurrence-engine//EN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Properties that count as significant changes in addition to
    /// `DTSTART, DTEND, DURATION, RRULE, RDATE, EXDATE, STATUS`.
    pub extra_significant_properties: Vec<String>,
    /// Maximum instances a single rule may produce for one expansion.
    pub expansion_limit: u16,
    /// PRODID of documents created when a series is split.
    pub product_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extra_significant_properties: Vec::new(),
            expansion_limit: DEFAULT_EXPANSION_LIMIT,
            product_id: DEFAULT_PRODUCT_ID.to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON. Property names are uppercased.
    ///
    /// # Errors
    /// Returns `RecurrenceError::Config` if the JSON is malformed or a field
    /// has the wrong type.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(json)?;
        for name in &mut config.extra_significant_properties {
            name.make_ascii_uppercase();
        }
        Ok(config)
    }

    /// The significant-change set derived from this configuration.
    pub fn significant_properties(&self) -> SignificantProperties {
        SignificantProperties::with_extra(&self.extra_significant_properties)
    }
}
