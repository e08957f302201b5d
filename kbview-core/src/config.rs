use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Viewer settings read from `config.toml`; every key is optional.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "search_debounce_ms")]
    pub search_debounce: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "zoom_debounce_ms")]
    pub zoom_debounce: Duration,
    /// Pages scanned per search; `0` scans the whole document.
    pub search_page_limit: u32,
    pub min_fit_scale: f32,
    pub max_fit_scale: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub zoom_step: f32,
    pub spreadsheet_page_size: usize,
    pub highlight_min_width: f32,
    pub highlight_padding: f32,
    /// Container width in pixels used for the fit-to-width scale.
    pub container_width: f32,
    pub token_file: Option<PathBuf>,
    pub pdfium_library: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            search_debounce: Duration::from_millis(300),
            zoom_debounce: Duration::from_millis(150),
            search_page_limit: 10,
            min_fit_scale: 0.5,
            max_fit_scale: 1.5,
            min_zoom: 0.5,
            max_zoom: 2.0,
            zoom_step: 0.1,
            spreadsheet_page_size: 50,
            highlight_min_width: 2.0,
            highlight_padding: 1.0,
            container_width: 900.0,
            token_file: None,
            pdfium_library: None,
        }
    }
}

impl ViewerConfig {
    /// Loads the file at `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn search_page_limit(&self) -> Option<u32> {
        (self.search_page_limit > 0).then_some(self.search_page_limit)
    }

    pub fn spreadsheet_page_size(&self) -> usize {
        self.spreadsheet_page_size.max(1)
    }
}
