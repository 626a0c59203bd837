use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::search::SearchMode;
use crate::session::{DEFAULT_SCALE, DEFAULT_SEARCH_VIEW_LENGTH, OpenOptions};
use crate::surface::ImageEncoding;

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub scale: f32,
    pub search_view_length: usize,
    pub search_mode: SearchMode,
    pub text_cache_pages: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            search_view_length: DEFAULT_SEARCH_VIEW_LENGTH,
            search_mode: SearchMode::Pattern,
            text_cache_pages: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub format: ImageEncoding,
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: ImageEncoding::Png,
            directory: PathBuf::from("."),
        }
    }
}

impl Config {
    pub fn load() -> AppResult<Self> {
        let Some(path) = default_config_path() else {
            return Ok(Self::default());
        };
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        if !path.is_file() {
            return Err(AppError::invalid_argument(format!(
                "config path is not a regular file: {}",
                path.display()
            )));
        }

        let raw = fs::read_to_string(path).map_err(|source| {
            AppError::io_with_context(source, format!("failed to read config: {}", path.display()))
        })?;
        let parsed = toml::from_str::<Self>(&raw).map_err(|source| {
            AppError::invalid_argument(format!(
                "failed to parse config {}: {source}",
                path.display()
            ))
        })?;
        Ok(parsed.sanitized())
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            scale: Some(self.session.scale),
            search_view_length: Some(self.session.search_view_length),
            search_mode: self.session.search_mode,
            encoding: self.output.format,
            text_cache_pages: self.session.text_cache_pages,
            ..Default::default()
        }
    }

    fn sanitized(mut self) -> Self {
        if !self.session.scale.is_finite() || self.session.scale <= 0.0 {
            self.session.scale = SessionConfig::default().scale;
        }
        if self.output.directory.as_os_str().is_empty() {
            self.output.directory = OutputConfig::default().directory;
        }
        self
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os("PDFPEEK_CONFIG_PATH")
        && !explicit.is_empty()
    {
        return Some(PathBuf::from(explicit));
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        return Some(PathBuf::from(xdg).join("pdfpeek").join("config.toml"));
    }
    if let Some(home) = std::env::var_os("HOME")
        && !home.is_empty()
    {
        return Some(
            PathBuf::from(home)
                .join(".config")
                .join("pdfpeek")
                .join("config.toml"),
        );
    }
    if let Some(appdata) = std::env::var_os("APPDATA")
        && !appdata.is_empty()
    {
        return Some(PathBuf::from(appdata).join("pdfpeek").join("config.toml"));
    }
    None
}
