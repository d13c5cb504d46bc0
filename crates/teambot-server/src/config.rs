//! Registry configuration.

use serde::Deserialize;

/// Configuration for [`crate::KeyRegistry`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Honour delete requests. Only test deployments enable this.
    pub allow_test_delete: bool,
}
