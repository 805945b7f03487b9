//! Status-line parsing for the heater controller.
//!
//! The device prints one line per report:
//!
//! ```text
//! Suhu: 32.5 C, Mode: Auto, Min: 30, Max: 40, Durasi Heater: 120s, Durasi Pompa: 60s
//! ```
//!
//! Every field except the temperature may be missing. Each field is pulled
//! out by its own extractor, so a damaged or truncated line still yields
//! whatever is readable.

use std::{fmt, num::IntErrorKind, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    records::{HeaterStatus, OperationHistory, TemperatureReading, TemperatureSetting},
    types::HeaterMode,
};

/// One lazily compiled single-capture pattern.
struct FieldPattern {
    source: &'static str,
    compiled: OnceLock<Option<Regex>>,
}

impl FieldPattern {
    const fn new(source: &'static str) -> Self {
        Self {
            source,
            compiled: OnceLock::new(),
        }
    }

    fn capture<'a>(&self, text: &'a str) -> Option<&'a str> {
        let regex = self
            .compiled
            .get_or_init(|| Regex::new(self.source).ok())
            .as_ref()?;
        regex
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|group| group.as_str())
    }

    /// Reads the leading number of the capture: digits with at most one
    /// decimal point, so `1.2.3` reads as `1.2`.
    fn float(&self, text: &str) -> Option<f64> {
        let raw = self.capture(text)?;
        let end = raw
            .match_indices('.')
            .nth(1)
            .map_or(raw.len(), |(index, _)| index);
        raw[..end]
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
    }

    /// Counts too large for `u64` saturate instead of vanishing.
    fn integer(&self, text: &str) -> Option<u64> {
        match self.capture(text)?.parse::<u64>() {
            Ok(value) => Some(value),
            Err(err) if *err.kind() == IntErrorKind::PosOverflow => Some(u64::MAX),
            Err(_) => None,
        }
    }
}

static TEMPERATURE: FieldPattern = FieldPattern::new(r"Suhu: ([\d.]+) C");
static MODE: FieldPattern = FieldPattern::new(r"Mode: (Auto|Off)");
static MIN: FieldPattern = FieldPattern::new(r"Min: ([\d.]+)");
static MAX: FieldPattern = FieldPattern::new(r"Max: ([\d.]+)");
static HEATER_DURATION: FieldPattern = FieldPattern::new(r"Durasi Heater: (\d+)s");
static PUMP_DURATION: FieldPattern = FieldPattern::new(r"Durasi Pompa: (\d+)s");

/// Partial view of one status line. Only the temperature is guaranteed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub temperature: f64,
    pub mode: Option<HeaterMode>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[serde(rename = "heaterDurationSeconds")]
    pub heater_duration_secs: Option<u64>,
    #[serde(rename = "pumpDurationSeconds")]
    pub pump_duration_secs: Option<u64>,
}

/// Parses a device status line.
///
/// Returns `None` when the text carries no readable temperature; that is how
/// unrelated or malformed messages are told apart, not an error.
pub fn parse_status(text: &str) -> Option<StatusReport> {
    let temperature = TEMPERATURE.float(text)?;

    Some(StatusReport {
        temperature,
        mode: MODE.capture(text).and_then(HeaterMode::from_device_token),
        min: MIN.float(text),
        max: MAX.float(text),
        heater_duration_secs: HEATER_DURATION.integer(text),
        pump_duration_secs: PUMP_DURATION.integer(text),
    })
}

impl StatusReport {
    pub fn new(temperature: f64) -> Self {
        Self {
            temperature,
            mode: None,
            min: None,
            max: None,
            heater_duration_secs: None,
            pump_duration_secs: None,
        }
    }

    pub fn reading(&self) -> Option<TemperatureReading> {
        Some(TemperatureReading {
            value: self.temperature,
        })
    }

    pub fn setting(&self) -> Option<TemperatureSetting> {
        Some(TemperatureSetting {
            min: self.min?,
            max: self.max?,
        })
    }

    pub fn heater_status(&self) -> Option<HeaterStatus> {
        self.mode.map(|status| HeaterStatus { status })
    }

    pub fn history(&self) -> Option<OperationHistory> {
        Some(OperationHistory {
            heater_duration_secs: self.heater_duration_secs?,
            pump_duration_secs: self.pump_duration_secs?,
        })
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Suhu: {} C", self.temperature)?;
        if let Some(mode) = self.mode {
            write!(f, ", Mode: {}", mode.device_token())?;
        }
        if let Some(min) = self.min {
            write!(f, ", Min: {min}")?;
        }
        if let Some(max) = self.max {
            write!(f, ", Max: {max}")?;
        }
        if let Some(secs) = self.heater_duration_secs {
            write!(f, ", Durasi Heater: {secs}s")?;
        }
        if let Some(secs) = self.pump_duration_secs {
            write!(f, ", Durasi Pompa: {secs}s")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const FULL_LINE: &str =
        "Suhu: 32.5 C, Mode: Auto, Min: 30, Max: 40, Durasi Heater: 120s, Durasi Pompa: 60s";

    #[test]
    fn parses_full_status_line() {
        let report = parse_status(FULL_LINE).unwrap();

        assert_eq!(
            report,
            StatusReport {
                temperature: 32.5,
                mode: Some(HeaterMode::Auto),
                min: Some(30.0),
                max: Some(40.0),
                heater_duration_secs: Some(120),
                pump_duration_secs: Some(60),
            }
        );
    }

    #[test]
    fn missing_temperature_is_not_a_report() {
        for text in [
            "",
            "hello",
            "Mode: Auto, Min: 30, Max: 40",
            "Suhu: -- C, Mode: Off",
            "suhu: 30.0 C",
            "Suhu: 30.0",
        ] {
            assert_eq!(parse_status(text), None, "input {text:?}");
        }
    }

    #[test]
    fn temperature_only_leaves_other_fields_empty() {
        let report = parse_status("Suhu: 27.25 C").unwrap();
        assert_eq!(report, StatusReport::new(27.25));
        assert!(report.setting().is_none());
        assert!(report.heater_status().is_none());
        assert!(report.history().is_none());
    }

    #[test]
    fn mode_tokens_are_case_sensitive() {
        let report = parse_status("Suhu: 30 C, Mode: Off").unwrap();
        assert_eq!(report.mode, Some(HeaterMode::Off));

        let report = parse_status("Suhu: 30 C, Mode: auto").unwrap();
        assert_eq!(report.mode, None);

        let report = parse_status("Suhu: 30 C, Mode: Heat").unwrap();
        assert_eq!(report.mode, None);
    }

    #[test]
    fn min_without_max_has_no_setting() {
        let report = parse_status("Suhu: 31 C, Mode: Auto, Min: 30, Durasi Heater: 5s, Durasi Pompa: 2s")
            .unwrap();

        assert_eq!(report.min, Some(30.0));
        assert_eq!(report.max, None);
        assert!(report.setting().is_none());
        assert!(report.heater_status().is_some());
        assert_eq!(
            report.history(),
            Some(OperationHistory {
                heater_duration_secs: 5,
                pump_duration_secs: 2,
            })
        );
    }

    #[test]
    fn numbers_read_their_leading_part() {
        let report = parse_status("Suhu: 30.5 C, Min: 1.2.3, Max: 40").unwrap();
        assert_eq!(report.min, Some(1.2));
        assert_eq!(report.max, Some(40.0));

        let report = parse_status("Suhu: 1.2.3 C").unwrap();
        assert_eq!(report.temperature, 1.2);
        assert_eq!(parse_status("Suhu: 31. C").unwrap().temperature, 31.0);
        assert_eq!(parse_status("Suhu: .5 C").unwrap().temperature, 0.5);
    }

    #[test]
    fn numbers_without_digits_are_unreadable() {
        assert_eq!(parse_status("Suhu: . C"), None);
        assert_eq!(parse_status("Suhu: ..5 C"), None);

        let report = parse_status("Suhu: 30 C, Min: ., Max: 40").unwrap();
        assert_eq!(report.min, None);
        assert!(report.setting().is_none());
    }

    #[test]
    fn oversized_durations_saturate() {
        let report =
            parse_status("Suhu: 30 C, Durasi Heater: 99999999999999999999999s, Durasi Pompa: 3s")
                .unwrap();
        assert_eq!(report.heater_duration_secs, Some(u64::MAX));
        assert_eq!(report.pump_duration_secs, Some(3));
    }

    #[test]
    fn durations_need_seconds_suffix() {
        let report = parse_status("Suhu: 30 C, Durasi Heater: 120, Durasi Pompa: 60s").unwrap();
        assert_eq!(report.heater_duration_secs, None);
        assert_eq!(report.pump_duration_secs, Some(60));
        assert!(report.history().is_none());
    }

    #[test]
    fn display_matches_device_grammar() {
        let report = parse_status(FULL_LINE).unwrap();
        assert_eq!(report.to_string(), FULL_LINE);

        let partial = StatusReport {
            max: Some(41.5),
            ..StatusReport::new(29.0)
        };
        assert_eq!(partial.to_string(), "Suhu: 29 C, Max: 41.5");
    }
}
