//! Configuration for Sonarch

use crate::error::{Result, SonarchError};
use std::path::PathBuf;
use std::time::Duration;

/// Name of the implementation that is always available.
pub const NULL_IMPLEMENTATION_NAME: &str = "null";

/// Configuration descriptor for a Sonarch audio system
#[derive(Debug, Clone)]
pub struct SonarchSystemDesc {
    /// Size of the preallocated audio memory pool in bytes
    pub pool_capacity: usize,
    /// Implementation to load at startup (None or "null" keeps the null implementation)
    pub implementation_name: Option<String>,
    /// Root folder of the controls and preloads data. Level data lives in `<config_path>/levels/<level>`
    pub config_path: PathBuf,
    /// Language handed to the implementation on `ChangeLanguage`
    pub language: String,
    /// Maximum number of pending requests per priority tier (None = unbounded)
    pub max_queue_depth: Option<usize>,
    /// Pending request count above which a backlog warning is logged
    pub backlog_warning_threshold: usize,
    /// How long the audio thread sleeps between drains when no request wakes it
    pub update_interval: Duration,
    /// Whether losing application focus mutes the implementation
    pub mute_on_focus_loss: bool,
}

impl Default for SonarchSystemDesc {
    fn default() -> Self {
        Self {
            pool_capacity: 13 * 1024 * 1024,
            implementation_name: Some(NULL_IMPLEMENTATION_NAME.to_string()),
            config_path: PathBuf::from("audio"),
            language: "english".to_string(),
            max_queue_depth: None,
            backlog_warning_threshold: 1024,
            update_interval: Duration::from_millis(10),
            mute_on_focus_loss: true,
        }
    }
}

impl SonarchSystemDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool_capacity(mut self, bytes: usize) -> Self {
        self.pool_capacity = bytes;
        self
    }

    pub fn implementation_name(mut self, name: Option<&str>) -> Self {
        self.implementation_name = name.map(str::to_string);
        self
    }

    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    pub fn language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    pub fn max_queue_depth(mut self, depth: Option<usize>) -> Self {
        self.max_queue_depth = depth;
        self
    }

    pub fn backlog_warning_threshold(mut self, threshold: usize) -> Self {
        self.backlog_warning_threshold = threshold;
        self
    }

    pub fn update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn mute_on_focus_loss(mut self, mute: bool) -> Self {
        self.mute_on_focus_loss = mute;
        self
    }

    /// Checks the values that cannot be recovered from at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.pool_capacity == 0 {
            return Err(SonarchError::Configuration(
                "Audio memory pool capacity must be greater than zero".into(),
            ));
        }
        if self.max_queue_depth == Some(0) {
            return Err(SonarchError::Configuration(
                "max_queue_depth must be greater than zero when set".into(),
            ));
        }
        Ok(())
    }

    /// Folder holding the data of a specific level.
    pub fn level_path(&self, level_name: &str) -> PathBuf {
        self.config_path.join("levels").join(level_name)
    }

    /// Implementation name normalised so that "null" and None compare equal.
    pub(crate) fn requested_implementation(&self) -> Option<&str> {
        normalize_implementation_name(self.implementation_name.as_deref())
    }
}

pub(crate) fn normalize_implementation_name(name: Option<&str>) -> Option<&str> {
    match name {
        Some(name) if !name.is_empty() && !name.eq_ignore_ascii_case(NULL_IMPLEMENTATION_NAME) => {
            Some(name)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_desc_is_valid() {
        let desc = SonarchSystemDesc::default();
        assert!(desc.validate().is_ok());
        assert_eq!(desc.requested_implementation(), None);
    }

    #[test]
    fn test_zero_pool_is_rejected() {
        let desc = SonarchSystemDesc::new().pool_capacity(0);
        assert!(matches!(
            desc.validate(),
            Err(SonarchError::Configuration(_))
        ));
    }

    #[test]
    fn test_level_path() {
        let desc = SonarchSystemDesc::new().config_path("data/audio");
        assert_eq!(
            desc.level_path("forest"),
            PathBuf::from("data/audio/levels/forest")
        );
    }

    #[test]
    fn test_null_name_normalisation() {
        assert_eq!(normalize_implementation_name(Some("NULL")), None);
        assert_eq!(normalize_implementation_name(Some("")), None);
        assert_eq!(normalize_implementation_name(Some("sdl")), Some("sdl"));
    }
}
