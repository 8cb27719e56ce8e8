/// Runtime configuration for the background service worker
use serde::{Deserialize, Serialize};

/// Storage key holding the full script list
pub const DEFAULT_SCRIPTS_KEY: &str = "userScripts";

/// Storage key holding the popup theme preference
pub const DEFAULT_THEME_KEY: &str = "theme";

/// Prefix of the per-script flag left in the page's global scope
pub const DEFAULT_MARKER_PREFIX: &str = "alterpage_";

/// Settings shared by the store, injector and coordinator.
///
/// Every field has a default, so a partial object coming from JavaScript
/// (or none at all) is enough to start the extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtensionConfig {
    pub scripts_key: String,
    pub theme_key: String,
    pub marker_prefix: String,
    /// URL schemes that never receive scripts (browser-internal pages)
    pub privileged_schemes: Vec<String>,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        ExtensionConfig {
            scripts_key: DEFAULT_SCRIPTS_KEY.to_string(),
            theme_key: DEFAULT_THEME_KEY.to_string(),
            marker_prefix: DEFAULT_MARKER_PREFIX.to_string(),
            privileged_schemes: [
                "chrome",
                "chrome-extension",
                "chrome-search",
                "chrome-untrusted",
                "devtools",
                "edge",
                "opera",
                "about",
                "view-source",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl ExtensionConfig {
    /// Check whether a scheme (without the trailing ':') is browser-internal
    pub fn is_privileged_scheme(&self, scheme: &str) -> bool {
        self.privileged_schemes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(scheme))
    }
}
