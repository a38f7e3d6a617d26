//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hooks::FrameOptions;

/// Settings shared by every frame a [`Context`](crate::hooks::Context) runs.
///
/// Every field has a default, so a partial document is valid:
///
/// ```rust
/// use weft_core::Config;
///
/// let config = Config::from_json(r#"{"id_prefix": "app-"}"#).unwrap();
/// assert_eq!(config.id_prefix, "app-");
/// assert!(config.frame.warn_on_hook_count_change);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prefix of the ids handed out by `use_id`.
    pub id_prefix: String,
    /// Options used by `Context::with_frame`.
    pub frame: FrameOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id_prefix: "weft-".to_owned(),
            frame: FrameOptions::default(),
        }
    }
}

impl Config {
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn nested_frame_options_are_read() {
        let config = Config::from_json(
            r#"{"frame": {"label": "root", "warn_on_hook_count_change": false}}"#,
        )
        .unwrap();

        assert_eq!(config.id_prefix, "weft-");
        assert_eq!(config.frame.label.as_deref(), Some("root"));
        assert!(!config.frame.warn_on_hook_count_change);
    }

    #[test]
    fn survives_a_json_round_trip() {
        let mut config = Config::default();
        config.id_prefix = "x-".into();
        let text = config.to_json().unwrap();
        assert_eq!(Config::from_json(&text).unwrap(), config);
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(Config::from_json("{\"id_prefix\": 4}").is_err());
    }
}
