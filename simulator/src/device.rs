use heater_common::{HeaterMode, StatusReport};

/// Room temperature; an idle tank cools towards it and never below.
const AMBIENT_TEMP_C: f64 = 25.0;

/// Very small thermal model of the heater/pump controller.
#[derive(Debug, Clone)]
pub struct DeviceModel {
    pub temperature: f64,
    pub mode: HeaterMode,
    pub min: f64,
    pub max: f64,
    heater_on: bool,
    heater_secs: u64,
    pump_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Mode(HeaterMode),
    Min(f64),
    Max(f64),
}

impl Command {
    /// Accepts `auto`, `off`, `min:<value>` and `max:<value>`, any case.
    pub fn parse(text: &str) -> Option<Self> {
        let lower = text.trim().to_ascii_lowercase();
        match lower.as_str() {
            "auto" => return Some(Self::Mode(HeaterMode::Auto)),
            "off" => return Some(Self::Mode(HeaterMode::Off)),
            _ => {}
        }

        let (key, value) = lower.split_once(':')?;
        let value = value.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
        match key.trim() {
            "min" => Some(Self::Min(value)),
            "max" => Some(Self::Max(value)),
            _ => None,
        }
    }
}

impl Default for DeviceModel {
    fn default() -> Self {
        Self {
            temperature: 29.0,
            mode: HeaterMode::Auto,
            min: 30.0,
            max: 40.0,
            heater_on: false,
            heater_secs: 0,
            pump_secs: 0,
        }
    }
}

impl DeviceModel {
    pub fn apply(&mut self, command: &Command) {
        match *command {
            Command::Mode(mode) => {
                self.mode = mode;
                if mode == HeaterMode::Off {
                    self.heater_on = false;
                }
            }
            Command::Min(min) => self.min = min.min(self.max),
            Command::Max(max) => self.max = max.max(self.min),
        }
    }

    /// Advances the model by `elapsed_secs` and returns the status line fields.
    pub fn step(&mut self, elapsed_secs: u64) -> StatusReport {
        if self.mode == HeaterMode::Auto {
            if self.temperature < self.min {
                self.heater_on = true;
            } else if self.temperature > self.max {
                self.heater_on = false;
            }
        }

        let minutes = elapsed_secs as f64 / 60.0;
        if self.heater_on {
            self.temperature += 0.8 * minutes;
            self.heater_secs += elapsed_secs;
            self.pump_secs += elapsed_secs / 2;
        } else {
            self.temperature = (self.temperature - 0.3 * minutes).max(AMBIENT_TEMP_C);
        }
        self.temperature = (self.temperature * 10.0).round() / 10.0;

        StatusReport {
            temperature: self.temperature,
            mode: Some(self.mode),
            min: Some(self.min),
            max: Some(self.max),
            heater_duration_secs: Some(self.heater_secs),
            pump_duration_secs: Some(self.pump_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use heater_common::parse_status;

    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("AUTO"), Some(Command::Mode(HeaterMode::Auto)));
        assert_eq!(Command::parse(" off "), Some(Command::Mode(HeaterMode::Off)));
        assert_eq!(Command::parse("Min: 31.5"), Some(Command::Min(31.5)));
        assert_eq!(Command::parse("max:45"), Some(Command::Max(45.0)));
        assert_eq!(Command::parse("max:hot"), None);
        assert_eq!(Command::parse("reboot"), None);
    }

    #[test]
    fn heats_below_min_in_auto() {
        let mut device = DeviceModel::default();
        let report = device.step(60);

        assert!(report.temperature > 29.0);
        assert_eq!(report.heater_duration_secs, Some(60));
        assert_eq!(report.pump_duration_secs, Some(30));
    }

    #[test]
    fn off_mode_stops_heating() {
        let mut device = DeviceModel::default();
        device.step(60);
        device.apply(&Command::Mode(HeaterMode::Off));

        let before = device.temperature;
        let report = device.step(60);
        assert!(report.temperature < before);
        assert_eq!(report.heater_duration_secs, Some(60));
    }

    #[test]
    fn idle_tank_settles_at_ambient() {
        let mut device = DeviceModel::default();
        device.apply(&Command::Mode(HeaterMode::Off));

        let mut report = device.step(30);
        for _ in 0..1_000 {
            report = device.step(30);
        }

        assert_eq!(report.temperature, AMBIENT_TEMP_C);
        let parsed = parse_status(&report.to_string()).unwrap();
        assert_eq!(parsed.temperature, AMBIENT_TEMP_C);
    }

    #[test]
    fn thresholds_stay_ordered() {
        let mut device = DeviceModel::default();
        device.apply(&Command::Min(50.0));
        assert_eq!(device.min, 40.0);
        device.apply(&Command::Max(10.0));
        assert_eq!(device.max, 40.0);
    }

    #[test]
    fn status_line_is_readable_by_bridge() {
        let mut device = DeviceModel::default();
        let line = device.step(30).to_string();

        let parsed = parse_status(&line).unwrap();
        assert_eq!(parsed.mode, Some(HeaterMode::Auto));
        assert!(parsed.setting().is_some());
        assert!(parsed.history().is_some());
    }
}
