//! Human-readable ETA rendering.

/// Render an ETA in seconds for display.
///
/// | Input          | Output          |
/// |----------------|-----------------|
/// | `None`         | `"unknown"`     |
/// | under 60 s     | `"< 1 min"`     |
/// | under an hour  | `"N min"`, rounded up |
/// | otherwise      | `"H h MM min"`  |
pub fn format_eta(eta_seconds: Option<f64>) -> String {
    let Some(secs) = eta_seconds.filter(|s| s.is_finite() && *s >= 0.0) else {
        return "unknown".to_string();
    };
    if secs < 60.0 {
        return "< 1 min".to_string();
    }

    let minutes = (secs / 60.0).ceil() as u64;
    if secs < 3600.0 {
        return format!("{} min", minutes);
    }
    format!("{} h {:02} min", minutes / 60, minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(None), "unknown");
        assert_eq!(format_eta(Some(f64::NAN)), "unknown");
        assert_eq!(format_eta(Some(0.0)), "< 1 min");
        assert_eq!(format_eta(Some(59.9)), "< 1 min");
        assert_eq!(format_eta(Some(60.0)), "1 min");
        assert_eq!(format_eta(Some(61.0)), "2 min");
        assert_eq!(format_eta(Some(3599.0)), "60 min");
        assert_eq!(format_eta(Some(3600.0)), "1 h 00 min");
        assert_eq!(format_eta(Some(5430.0)), "1 h 31 min");
    }
}
