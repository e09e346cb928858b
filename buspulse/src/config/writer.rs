//! INI serialization: `ConfigFile` → commented INI string.

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to the commented INI text written to `config.ini`.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[channel]
; Seconds a bus with no subscribers and no publishes is kept before removal
retention_secs = {}
; Seconds between sweeps for abandoned buses
sweep_interval_secs = {}
; Updates buffered per bus; slower subscribers skip the oldest
fanout_capacity = {}

[subscriber]
; Seconds without an update before a live bus is shown as stale
stale_timeout_secs = {}
; Milliseconds between staleness checks
tick_interval_ms = {}
; Recent positions kept for ETA estimation (minimum 2)
history_capacity = {}

[eta]
; Steps faster than this are treated as GPS jumps and ignored
max_speed_mps = {}
; Below this effective speed the bus is treated as stopped (no ETA)
min_speed_mps = {}
; Clean speed samples required for high confidence
high_confidence_samples = {}
; High confidence only within this many median step lengths of the target
horizon_steps = {}

[source]
; Ask the device for its most accurate fix
high_accuracy = {}
; Maximum age of a cached fix, in milliseconds (0 = always fresh)
maximum_age_ms = {}
; Milliseconds the device may take per fix before reporting a timeout
timeout_ms = {}
"#,
        config.channel.retention_secs,
        config.channel.sweep_interval_secs,
        config.channel.fanout_capacity,
        config.subscriber.stale_timeout_secs,
        config.subscriber.tick_interval_ms,
        config.subscriber.history_capacity,
        config.eta.max_speed_mps,
        config.eta.min_speed_mps,
        config.eta.high_confidence_samples,
        config.eta.horizon_steps,
        config.source.high_accuracy,
        config.source.maximum_age_ms,
        config.source.timeout_ms,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_config_reloads_identically() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.channel.retention_secs = 90;
        config.eta.max_speed_mps = 27.5;
        config.source.high_accuracy = false;
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_contains_every_section() {
        let text = to_config_string(&ConfigFile::default());
        for section in ["[channel]", "[subscriber]", "[eta]", "[source]"] {
            assert!(text.contains(section), "missing {}", section);
        }
        assert!(text.contains("min_speed_mps = 0.1"));
    }
}
