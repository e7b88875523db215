//! Runtime configuration.
//!
//! Nothing is read from or written to disk; hosts build a [`BridgeConfig`]
//! from defaults, JSON they already hold, or the environment.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::{BridgeError, Result};

/// Environment variable naming the directory that holds the PDFium library.
pub const LIBRARY_PATH_ENV: &str = "PDFBULL_PDFIUM_PATH";
/// Environment variable overriding [`BridgeConfig::max_render_dimension`].
pub const MAX_RENDER_DIMENSION_ENV: &str = "PDFBULL_MAX_RENDER_DIMENSION";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Draw annotation appearances.
    pub annotations: bool,
    /// Render with printing fidelity.
    pub print_quality: bool,
    /// Sub-pixel text anti-aliasing.
    pub lcd_text: bool,
    /// RGBA fill applied before drawing the page.
    pub background: [u8; 4],
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            annotations: true,
            print_quality: true,
            lcd_text: true,
            background: [255, 255, 255, 255],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub library_path: Option<PathBuf>,
    pub render: RenderOptions,
    /// Largest width or height, in pixels, a render may produce.
    pub max_render_dimension: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            render: RenderOptions::default(),
            max_render_dimension: 16_384,
        }
    }
}

impl BridgeConfig {
    /// Parse a JSON object; missing fields keep their defaults.
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data)
            .map_err(|e| BridgeError::validation(format!("invalid bridge config: {e}")))
    }

    /// Defaults overridden by `PDFBULL_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(path) = env::var_os(LIBRARY_PATH_ENV).filter(|p| !p.is_empty()) {
            config.library_path = Some(PathBuf::from(path));
        }
        if let Ok(value) = env::var(MAX_RENDER_DIMENSION_ENV) {
            match value.trim().parse::<u32>() {
                Ok(limit) if limit > 0 => config.max_render_dimension = limit,
                _ => tracing::warn!(
                    "ignoring {MAX_RENDER_DIMENSION_ENV}={value:?}, expected a positive integer"
                ),
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_addon_flags() {
        let config = BridgeConfig::default();
        assert!(config.render.annotations);
        assert!(config.render.print_quality);
        assert!(config.render.lcd_text);
        assert_eq!(config.render.background, [255, 255, 255, 255]);
        assert!(config.library_path.is_none());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            BridgeConfig::from_json(r#"{"render": {"lcd_text": false}, "library_path": "/opt/pdfium"}"#)
                .unwrap();
        assert!(!config.render.lcd_text);
        assert!(config.render.annotations);
        assert_eq!(config.library_path, Some(PathBuf::from("/opt/pdfium")));
        assert_eq!(config.max_render_dimension, 16_384);
    }

    #[test]
    fn test_invalid_json_is_validation_error() {
        let err = BridgeConfig::from_json("{not json").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }
}
