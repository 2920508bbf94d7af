//! Configuration file management.
//!
//! Reads/writes `~/.overhead/config.yaml`: receiver location, overhead alert
//! radius and webhook, and the tracking timeout.

use std::path::PathBuf;

use crate::registry::DEFAULT_TIMEOUT_SECS;
use crate::types::{OverheadError, Position, Result};

/// Default receiver location.
pub const DEFAULT_LAT: f64 = 55.910838;
pub const DEFAULT_LON: f64 = -3.236900;

/// Default overhead alert radius.
pub const DEFAULT_RADIUS_MILES: f64 = 5.0;

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub receiver: ReceiverConfig,
    pub alert: AlertConfig,
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverConfig {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertConfig {
    pub radius_miles: f64,
    pub webhook: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackingConfig {
    pub timeout_secs: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            receiver: ReceiverConfig {
                lat: DEFAULT_LAT,
                lon: DEFAULT_LON,
            },
            alert: AlertConfig {
                radius_miles: DEFAULT_RADIUS_MILES,
                webhook: None,
            },
            tracking: TrackingConfig {
                timeout_secs: DEFAULT_TIMEOUT_SECS,
            },
        }
    }
}

impl Config {
    /// Receiver location as the registry reference point.
    pub fn reference(&self) -> Position {
        Position {
            lat: self.receiver.lat,
            lon: self.receiver.lon,
        }
    }
}

/// Get the config directory path (`~/.overhead/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".overhead")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.overhead/config.yaml`.
///
/// A missing file yields the defaults; an unreadable one is an error.
pub fn load_config() -> Result<Config> {
    let path = config_file();
    if !path.exists() {
        return Ok(Config::default());
    }

    let text = std::fs::read_to_string(&path)?;
    parse_config(&text)
}

/// Save config to `~/.overhead/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;

    let path = config_file();
    std::fs::write(&path, serialize_config(config))?;

    Ok(path)
}

/// Parse simple YAML-like config text. Unknown keys are ignored.
pub fn parse_config(text: &str) -> Result<Config> {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for (lineno, line) in text.lines().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let Some((key, val)) = stripped.split_once(':') else {
            return Err(OverheadError::Config(format!(
                "line {}: expected `key: value`",
                lineno + 1
            )));
        };
        let key = key.trim();
        let val = val.trim();

        let is_indented = line.starts_with("  ") || line.starts_with('\t');
        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }

        let Some(section) = current_section.as_deref() else {
            continue;
        };
        let bad = |what: &str| {
            OverheadError::Config(format!("line {}: invalid {section}.{what}: {val}", lineno + 1))
        };

        match (section, key) {
            ("receiver", "lat") => config.receiver.lat = parse_float_value(val).ok_or_else(|| bad(key))?,
            ("receiver", "lon") => config.receiver.lon = parse_float_value(val).ok_or_else(|| bad(key))?,
            ("alert", "radius_miles") => {
                config.alert.radius_miles = parse_float_value(val).ok_or_else(|| bad(key))?
            }
            ("alert", "webhook") => config.alert.webhook = parse_string_value(val),
            ("tracking", "timeout_secs") => {
                config.tracking.timeout_secs = parse_float_value(val).ok_or_else(|| bad(key))?
            }
            _ => {}
        }
    }

    Ok(config)
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    if (val.starts_with('"') && val.ends_with('"') && val.len() >= 2)
        || (val.starts_with('\'') && val.ends_with('\'') && val.len() >= 2)
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_float_value(val: &str) -> Option<f64> {
    val.parse().ok().filter(|v: &f64| v.is_finite())
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let mut lines = vec!["# overhead configuration".to_string(), String::new()];

    lines.push("receiver:".into());
    lines.push(format!("  lat: {}", config.receiver.lat));
    lines.push(format!("  lon: {}", config.receiver.lon));
    lines.push(String::new());

    lines.push("alert:".into());
    lines.push(format!("  radius_miles: {}", config.alert.radius_miles));
    match &config.alert.webhook {
        Some(url) => lines.push(format!("  webhook: \"{url}\"")),
        None => lines.push("  webhook: null".into()),
    }
    lines.push(String::new());

    lines.push("tracking:".into());
    lines.push(format!("  timeout_secs: {}", config.tracking.timeout_secs));

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.receiver.lat, 55.910838);
        assert_eq!(config.receiver.lon, -3.2369);
        assert_eq!(config.alert.radius_miles, 5.0);
        assert_eq!(config.tracking.timeout_secs, 60.0);
        assert!(config.alert.webhook.is_none());
    }

    #[test]
    fn test_parse_config() {
        let text = r#"
receiver:
  lat: 35.5
  lon: -82.5

alert:
  radius_miles: 3
  webhook: "https://example.com/hook"

tracking:
  timeout_secs: 120
"#;
        let config = parse_config(text).unwrap();
        assert_eq!(config.reference(), Position { lat: 35.5, lon: -82.5 });
        assert_eq!(config.alert.radius_miles, 3.0);
        assert_eq!(config.alert.webhook, Some("https://example.com/hook".into()));
        assert_eq!(config.tracking.timeout_secs, 120.0);
    }

    #[test]
    fn test_parse_config_partial_keeps_defaults() {
        let config = parse_config("alert:\n  webhook: ~\n").unwrap();
        assert_eq!(config.receiver.lat, DEFAULT_LAT);
        assert!(config.alert.webhook.is_none());
    }

    #[test]
    fn test_parse_config_ignores_unknown_keys() {
        let text = "receiver:\n  name: \"roof\"\n  lat: 1.5\nextra: 3\n";
        let config = parse_config(text).unwrap();
        assert_eq!(config.receiver.lat, 1.5);
    }

    #[test]
    fn test_parse_config_rejects_bad_number() {
        let err = parse_config("receiver:\n  lat: north\n").unwrap_err();
        assert!(err.to_string().contains("receiver.lat"), "{err}");

        assert!(parse_config("tracking:\n  timeout_secs: NaN\n").is_err());
    }

    #[test]
    fn test_parse_config_rejects_garbage_line() {
        assert!(parse_config("receiver\n").is_err());
    }

    #[test]
    fn test_roundtrip() {
        let config = Config {
            receiver: ReceiverConfig {
                lat: 35.5,
                lon: -82.5,
            },
            alert: AlertConfig {
                radius_miles: 2.5,
                webhook: Some("https://example.com".into()),
            },
            tracking: TrackingConfig { timeout_secs: 90.0 },
        };
        let parsed = parse_config(&serialize_config(&config)).unwrap();
        assert_eq!(parsed, config);
    }
}
