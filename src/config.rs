// Add-on preferences. Loaded from JSON with per-field defaults, clamped on access.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RecordError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    /// Port of the mod's HTTP API on localhost. Zero means unset.
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default)]
    pub ow_bodies_folder: Option<PathBuf>,
    #[serde(default)]
    pub ow_assets_folder: Option<PathBuf>,
    /// Comma-separated object paths skipped by body import.
    #[serde(default)]
    pub import_ignore_paths: String,
    /// Comma-separated layer names skipped by body import.
    #[serde(default)]
    pub import_ignore_layers: String,
    /// Seconds between modal timer events.
    #[serde(default = "default_modal_timer_delay")]
    pub modal_timer_delay: f64,
    #[serde(default = "default_animation_chunk_size")]
    pub animation_chunk_size: u32,
    /// Unchanged progress polls tolerated while the recorder still reports in progress.
    #[serde(default = "default_stall_poll_limit")]
    pub stall_poll_limit: Option<u32>,
    /// Seconds before a single request to the mod is abandoned.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,
}

fn default_api_port() -> u16 {
    2209
}

fn default_modal_timer_delay() -> f64 {
    0.1
}

fn default_animation_chunk_size() -> u32 {
    50
}

fn default_stall_poll_limit() -> Option<u32> {
    Some(600)
}

fn default_request_timeout() -> f64 {
    10.0
}

/// Seconds as a `Duration`; NaN, infinite or out-of-range values fall back.
fn seconds_or(secs: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(secs)
        .or_else(|_| Duration::try_from_secs_f64(fallback))
        .unwrap_or_default()
}

const MIN_TIMER_DELAY: f64 = 0.001;

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            api_port: default_api_port(),
            ow_bodies_folder: None,
            ow_assets_folder: None,
            import_ignore_paths: String::new(),
            import_ignore_layers: String::new(),
            modal_timer_delay: default_modal_timer_delay(),
            animation_chunk_size: default_animation_chunk_size(),
            stall_poll_limit: default_stall_poll_limit(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Preferences {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn base_url(&self) -> String {
        format!("http://localhost:{}/", self.api_port)
    }

    pub fn has_api_port(&self) -> bool {
        self.api_port != 0
    }

    pub fn require_api_port(&self) -> Result<u16, RecordError> {
        if self.has_api_port() {
            Ok(self.api_port)
        } else {
            Err(RecordError::PreconditionViolated(
                "no API port configured in preferences".to_string(),
            ))
        }
    }

    pub fn timer_delay(&self) -> Duration {
        if self.modal_timer_delay.is_nan() {
            return seconds_or(default_modal_timer_delay(), 0.0);
        }
        seconds_or(self.modal_timer_delay.max(MIN_TIMER_DELAY), default_modal_timer_delay())
    }

    pub fn chunk_size(&self) -> u32 {
        self.animation_chunk_size.max(1)
    }

    pub fn timeout(&self) -> Duration {
        let secs = if self.request_timeout > 0.0 {
            self.request_timeout
        } else {
            default_request_timeout()
        };
        seconds_or(secs, default_request_timeout())
    }

    pub fn ignore_paths(&self) -> Vec<&str> {
        split_list(&self.import_ignore_paths)
    }

    pub fn ignore_layers(&self) -> Vec<&str> {
        split_list(&self.import_ignore_layers)
    }

    /// True when `path` equals an ignored path or lies below one.
    pub fn is_ignored_path(&self, path: &str) -> bool {
        self.ignore_paths().iter().any(|ignored| {
            path == *ignored
                || path
                    .strip_prefix(ignored)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

fn split_list(list: &str) -> Vec<&str> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_json() {
        let prefs = Preferences::from_json("{}").unwrap();
        assert_eq!(prefs.api_port, 2209);
        assert_eq!(prefs.base_url(), "http://localhost:2209/");
        assert_eq!(prefs.timer_delay(), Duration::from_millis(100));
        assert_eq!(prefs.chunk_size(), 50);
    }

    #[test]
    fn clamps_timer_and_chunk_size() {
        let prefs = Preferences {
            modal_timer_delay: 0.0,
            animation_chunk_size: 0,
            ..Default::default()
        };
        assert_eq!(prefs.timer_delay(), Duration::from_millis(1));
        assert_eq!(prefs.chunk_size(), 1);
    }

    #[test]
    fn oversized_or_odd_durations_fall_back() {
        let prefs =
            Preferences::from_json(r#"{"modal_timer_delay": 1e30, "request_timeout": 1e30}"#)
                .unwrap();
        assert_eq!(prefs.timer_delay(), Duration::from_millis(100));
        assert_eq!(prefs.timeout(), Duration::from_secs(10));

        let prefs = Preferences {
            modal_timer_delay: f64::NAN,
            request_timeout: -3.0,
            ..Default::default()
        };
        assert_eq!(prefs.timer_delay(), Duration::from_millis(100));
        assert_eq!(prefs.timeout(), Duration::from_secs(10));

        let prefs = Preferences {
            request_timeout: f64::INFINITY,
            ..Default::default()
        };
        assert_eq!(prefs.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn zero_port_is_unset() {
        let prefs = Preferences {
            api_port: 0,
            ..Default::default()
        };
        assert!(matches!(
            prefs.require_api_port(),
            Err(RecordError::PreconditionViolated(_))
        ));
    }

    #[test]
    fn comma_lists() {
        let prefs = Preferences::from_json(
            r#"{"import_ignore_paths":" Sector/Props , ,Sector/Fog","import_ignore_layers":"Ignore Raycast"}"#,
        )
        .unwrap();
        assert_eq!(prefs.ignore_paths(), vec!["Sector/Props", "Sector/Fog"]);
        assert_eq!(prefs.ignore_layers(), vec!["Ignore Raycast"]);
        assert!(prefs.is_ignored_path("Sector/Props"));
        assert!(prefs.is_ignored_path("Sector/Props/Tree"));
        assert!(!prefs.is_ignored_path("Sector/PropsExtra"));
    }
}
