//! INI parsing: `Ini` → `ConfigFile`.
//!
//! The single place where INI key names are mapped to struct fields.

use std::str::FromStr;

use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [channel] section
    if let Some(section) = ini.section(Some("channel")) {
        let s = Section::new("channel", section);
        if let Some(v) = s.parse::<u64>("retention_secs", "expected whole seconds")? {
            config.channel.retention_secs = v;
        }
        if let Some(v) = s.parse::<u64>("sweep_interval_secs", "expected whole seconds")? {
            s.check("sweep_interval_secs", v > 0, "must be at least 1")?;
            config.channel.sweep_interval_secs = v;
        }
        if let Some(v) = s.parse::<usize>("fanout_capacity", "expected a positive integer")? {
            s.check("fanout_capacity", v > 0, "must be at least 1")?;
            config.channel.fanout_capacity = v;
        }
    }

    // [subscriber] section
    if let Some(section) = ini.section(Some("subscriber")) {
        let s = Section::new("subscriber", section);
        if let Some(v) = s.parse::<u64>("stale_timeout_secs", "expected whole seconds")? {
            s.check("stale_timeout_secs", v > 0, "must be at least 1")?;
            config.subscriber.stale_timeout_secs = v;
        }
        if let Some(v) = s.parse::<u64>("tick_interval_ms", "expected milliseconds")? {
            s.check("tick_interval_ms", v > 0, "must be at least 1")?;
            config.subscriber.tick_interval_ms = v;
        }
        if let Some(v) = s.parse::<usize>("history_capacity", "expected a positive integer")? {
            s.check(
                "history_capacity",
                v >= 2,
                "must be at least 2 to estimate speed",
            )?;
            config.subscriber.history_capacity = v;
        }
    }

    // [eta] section
    if let Some(section) = ini.section(Some("eta")) {
        let s = Section::new("eta", section);
        if let Some(v) = s.parse::<f64>("max_speed_mps", "expected meters per second")? {
            s.check("max_speed_mps", v.is_finite() && v > 0.0, "must be positive")?;
            config.eta.max_speed_mps = v;
        }
        if let Some(v) = s.parse::<f64>("min_speed_mps", "expected meters per second")? {
            s.check("min_speed_mps", v.is_finite() && v >= 0.0, "must not be negative")?;
            config.eta.min_speed_mps = v;
        }
        if let Some(v) =
            s.parse::<usize>("high_confidence_samples", "expected a positive integer")?
        {
            s.check("high_confidence_samples", v > 0, "must be at least 1")?;
            config.eta.high_confidence_samples = v;
        }
        if let Some(v) = s.parse::<f64>("horizon_steps", "expected a number")? {
            s.check("horizon_steps", v.is_finite() && v > 0.0, "must be positive")?;
            config.eta.horizon_steps = v;
        }
        if config.eta.min_speed_mps >= config.eta.max_speed_mps {
            return Err(ConfigFileError::InvalidValue {
                section: "eta".to_string(),
                key: "min_speed_mps".to_string(),
                value: config.eta.min_speed_mps.to_string(),
                reason: format!("must be below max_speed_mps ({})", config.eta.max_speed_mps),
            });
        }
    }

    // [source] section
    if let Some(section) = ini.section(Some("source")) {
        let s = Section::new("source", section);
        if let Some(v) = section.get("high_accuracy") {
            config.source.high_accuracy = parse_bool(v)
                .ok_or_else(|| s.invalid("high_accuracy", v, "expected true or false"))?;
        }
        if let Some(v) = s.parse::<u64>("maximum_age_ms", "expected milliseconds")? {
            config.source.maximum_age_ms = v;
        }
        if let Some(v) = s.parse::<u64>("timeout_ms", "expected milliseconds")? {
            s.check("timeout_ms", v > 0, "must be at least 1")?;
            config.source.timeout_ms = v;
        }
    }

    Ok(config)
}

/// One INI section being parsed, for error reporting.
struct Section<'a> {
    name: &'static str,
    properties: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'static str, properties: &'a Properties) -> Self {
        Self { name, properties }
    }

    /// Parse `key` if present. Empty values are treated as absent.
    fn parse<T: FromStr>(&self, key: &str, reason: &str) -> Result<Option<T>, ConfigFileError> {
        let Some(raw) = self.properties.get(key) else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<T>()
            .map(Some)
            .map_err(|_| self.invalid(key, raw, reason))
    }

    fn check(&self, key: &str, ok: bool, reason: &str) -> Result<(), ConfigFileError> {
        if ok {
            return Ok(());
        }
        let value = self.properties.get(key).unwrap_or_default().trim();
        Err(self.invalid(key, value, reason))
    }

    fn invalid(&self, key: &str, value: &str, reason: &str) -> ConfigFileError {
        ConfigFileError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub(super) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn load(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");
        std::fs::write(&config_path, content).unwrap();
        ConfigFile::load_from(&config_path)
    }

    #[test]
    fn test_partial_config() {
        let config = load(
            r#"
[channel]
retention_secs = 120

[subscriber]
stale_timeout_secs = 30
"#,
        )
        .unwrap();

        assert_eq!(config.channel.retention_secs, 120);
        assert_eq!(config.subscriber.stale_timeout_secs, 30);
        // Untouched values keep defaults
        assert_eq!(config.channel.fanout_capacity, 64);
        assert_eq!(config.eta, ConfigFile::default().eta);
    }

    #[test]
    fn test_all_sections() {
        let config = load(
            r#"
[channel]
retention_secs = 30
sweep_interval_secs = 5
fanout_capacity = 16

[subscriber]
stale_timeout_secs = 20
tick_interval_ms = 250
history_capacity = 12

[eta]
max_speed_mps = 30.5
min_speed_mps = 0.5
high_confidence_samples = 6
horizon_steps = 10

[source]
high_accuracy = off
maximum_age_ms = 1000
timeout_ms = 8000
"#,
        )
        .unwrap();

        assert_eq!(config.channel.sweep_interval_secs, 5);
        assert_eq!(config.subscriber.tick_interval_ms, 250);
        assert_eq!(config.subscriber.history_capacity, 12);
        assert_eq!(config.eta.max_speed_mps, 30.5);
        assert_eq!(config.eta.high_confidence_samples, 6);
        assert!(!config.source.high_accuracy);
        assert_eq!(config.source.timeout_ms, 8000);
    }

    #[test]
    fn test_invalid_number() {
        let err = load("[channel]\nretention_secs = soon\n").unwrap_err();
        assert!(err.to_string().contains("channel.retention_secs"));
        assert!(err.to_string().contains("soon"));
    }

    #[test]
    fn test_zero_fanout_rejected() {
        let err = load("[channel]\nfanout_capacity = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigFileError::InvalidValue { ref key, .. } if key == "fanout_capacity"
        ));
    }

    #[test]
    fn test_history_capacity_minimum() {
        assert!(load("[subscriber]\nhistory_capacity = 1\n").is_err());
        assert!(load("[subscriber]\nhistory_capacity = 2\n").is_ok());
    }

    #[test]
    fn test_min_speed_must_be_below_max() {
        let err = load("[eta]\nmax_speed_mps = 1\nmin_speed_mps = 2\n").unwrap_err();
        assert!(err.to_string().contains("max_speed_mps"));
    }

    #[test]
    fn test_invalid_bool() {
        let err = load("[source]\nhigh_accuracy = maybe\n").unwrap_err();
        assert!(err.to_string().contains("high_accuracy"));
    }

    #[test]
    fn test_empty_value_keeps_default() {
        let config = load("[source]\ntimeout_ms =\n").unwrap();
        assert_eq!(config.source.timeout_ms, 5000);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool(" Yes "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("nah"), None);
    }
}
