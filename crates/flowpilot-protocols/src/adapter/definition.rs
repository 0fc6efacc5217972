//! Adapter definition types.

use serde::{Deserialize, Serialize};

use crate::types::Metadata;

/// Which operations an adapter supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterDirection {
    Input,
    Output,
    Bidirectional,
}

impl AdapterDirection {
    /// Whether the adapter may be read from.
    pub fn supports_input(self) -> bool {
        matches!(self, Self::Input | Self::Bidirectional)
    }

    /// Whether the adapter may be written to.
    pub fn supports_output(self) -> bool {
        matches!(self, Self::Output | Self::Bidirectional)
    }
}

/// Definition of an adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterDefinition {
    /// Unique identifier for the adapter.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Supported operations.
    pub direction: AdapterDirection,

    /// Category used for grouped listings.
    #[serde(default)]
    pub category: String,

    /// Whether the adapter may be invoked.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Additional metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_enabled() -> bool {
    true
}

impl AdapterDefinition {
    /// Create a new adapter definition.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        direction: AdapterDirection,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            direction,
            category: String::new(),
            enabled: true,
            metadata: Metadata::new(),
        }
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Set the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}
