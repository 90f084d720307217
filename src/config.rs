//! TOML preparation recipes and preset definitions.
//!
//! A recipe lists the edits that turn an exported feeder model into one the
//! simulator can run. [`crate::prep::apply`] carries them out.

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::manager::helpers::DATE_FORMAT;

/// Top-level preparation recipe parsed from TOML.
///
/// Every section defaults to "leave the model alone". Load from TOML with
/// [`PrepConfig::from_toml_file`] or start from a preset with
/// [`PrepConfig::from_preset`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrepConfig {
    /// Clock fields to set.
    #[serde(default)]
    pub clock: ClockConfig,
    /// Components needed to run a bare feeder export.
    #[serde(default)]
    pub run: RunConfig,
    /// Switch status normalization.
    #[serde(default)]
    pub switches: SwitchConfig,
    /// Triplex load handling.
    #[serde(default)]
    pub loads: LoadConfig,
    /// Solar object handling.
    #[serde(default)]
    pub solar: SolarConfig,
    /// Inverter DC source sizing.
    #[serde(default)]
    pub inverters: InverterConfig,
    /// Substation metering.
    #[serde(default)]
    pub substation: SubstationConfig,
}

/// Clock fields. Timestamps use `YYYY-mm-dd HH:MM:SS`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockConfig {
    pub starttime: Option<String>,
    pub stoptime: Option<String>,
    /// Simulator timezone string, e.g. `EST+5EDT`.
    pub timezone: Option<String>,
}

impl ClockConfig {
    /// Returns `true` if any clock field is set.
    pub fn is_set(&self) -> bool {
        self.starttime.is_some() || self.stoptime.is_some() || self.timezone.is_some()
    }

    /// Parsed start time.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the value is not a valid timestamp.
    pub fn start(&self) -> Result<Option<NaiveDateTime>, ConfigError> {
        self.starttime
            .as_deref()
            .map(|v| parse_timestamp("clock.starttime", v))
            .transpose()
    }

    /// Parsed stop time.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the value is not a valid timestamp.
    pub fn stop(&self) -> Result<Option<NaiveDateTime>, ConfigError> {
        self.stoptime
            .as_deref()
            .map(|v| parse_timestamp("clock.stoptime", v))
            .transpose()
    }
}

/// Run component parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Add run components (requires `clock.starttime` and `clock.stoptime`).
    pub enabled: bool,
    /// Swing bus voltage (V). Defaults to the substation's nominal voltage.
    pub v_source: Option<f64>,
    /// Enable the simulator profiler.
    pub profiler: bool,
    /// Minimum simulation timestep (seconds, must be > 0).
    pub minimum_timestep: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            v_source: None,
            profiler: false,
            minimum_timestep: 60,
        }
    }
}

/// Switch handling.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SwitchConfig {
    /// Convert `status` into per-phase states.
    pub normalize: bool,
    /// Operate converted switches as a bank instead of individually.
    pub banked: bool,
}

/// Triplex load handling.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadConfig {
    /// Strip load parameters from every triplex load.
    pub clear_triplex: bool,
}

/// Solar handling.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolarConfig {
    /// Remove every solar object.
    pub remove_all: bool,
}

/// Inverter handling.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InverterConfig {
    /// Size each inverter's DC source from its rated power.
    pub set_dc_source: bool,
}

/// Substation handling.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubstationConfig {
    /// Insert a meter below the swing substation.
    pub add_meter: bool,
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"clock.starttime"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

fn parse_timestamp(field: &str, value: &str) -> Result<NaiveDateTime, ConfigError> {
    NaiveDateTime::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| ConfigError {
        field: field.to_string(),
        message: format!("\"{value}\" is not a YYYY-mm-dd HH:MM:SS timestamp ({e})"),
    })
}

impl PrepConfig {
    /// Returns the passthrough recipe: the model is written back unchanged.
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Returns the runnable preset: run components plus a one-day clock.
    pub fn runnable() -> Self {
        Self {
            clock: ClockConfig {
                starttime: Some("2020-01-01 00:00:00".to_string()),
                stoptime: Some("2020-01-02 00:00:00".to_string()),
                timezone: Some("UTC0".to_string()),
            },
            run: RunConfig {
                enabled: true,
                ..RunConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["passthrough", "runnable"];

    /// Loads a recipe from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "passthrough" => Ok(Self::passthrough()),
            "runnable" => Ok(Self::runnable()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a recipe from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "recipe".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a recipe from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if the recipe is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let c = &self.clock;

        let start = c.start().unwrap_or_else(|e| {
            errors.push(e);
            None
        });
        let stop = c.stop().unwrap_or_else(|e| {
            errors.push(e);
            None
        });
        if let (Some(start), Some(stop)) = (start, stop) {
            if stop <= start {
                errors.push(ConfigError {
                    field: "clock.stoptime".into(),
                    message: "must be after clock.starttime".into(),
                });
            }
        }
        if c.timezone.as_deref().is_some_and(|tz| tz.trim().is_empty()) {
            errors.push(ConfigError {
                field: "clock.timezone".into(),
                message: "must not be empty".into(),
            });
        }

        let r = &self.run;
        if r.enabled && (c.starttime.is_none() || c.stoptime.is_none()) {
            errors.push(ConfigError {
                field: "run.enabled".into(),
                message: "requires clock.starttime and clock.stoptime".into(),
            });
        }
        if r.minimum_timestep == 0 {
            errors.push(ConfigError {
                field: "run.minimum_timestep".into(),
                message: "must be > 0".into(),
            });
        }
        if let Some(v) = r.v_source {
            if !(v.is_finite() && v > 0.0) {
                errors.push(ConfigError {
                    field: "run.v_source".into(),
                    message: "must be a positive voltage".into(),
                });
            }
        }

        if self.switches.banked && !self.switches.normalize {
            errors.push(ConfigError {
                field: "switches.banked".into(),
                message: "has no effect unless switches.normalize is set".into(),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_preset_valid() {
        let cfg = PrepConfig::passthrough();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "passthrough should be valid: {errors:?}");
        assert!(!cfg.run.enabled);
        assert!(!cfg.clock.is_set());
    }

    #[test]
    fn from_preset_unknown() {
        let err = PrepConfig::from_preset("nonexistent");
        assert!(err.is_err());
        let e = err.unwrap_err();
        assert!(e.message.contains("unknown preset"));
    }

    #[test]
    fn all_presets_are_valid() {
        for name in PrepConfig::PRESETS {
            let cfg = PrepConfig::from_preset(name);
            assert!(cfg.is_ok(), "preset \"{name}\" should load");
            let errors = cfg.as_ref().map(|c| c.validate()).unwrap_or_default();
            assert!(
                errors.is_empty(),
                "preset \"{name}\" should be valid: {errors:?}"
            );
        }
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[clock]
starttime = "2021-06-01 00:00:00"
stoptime = "2021-06-02 00:00:00"
timezone = "PST+8PDT"

[run]
enabled = true
v_source = 7200.0
profiler = true
minimum_timestep = 15

[switches]
normalize = true
banked = true

[loads]
clear_triplex = true

[solar]
remove_all = true

[inverters]
set_dc_source = true

[substation]
add_meter = true
"#;
        let cfg = PrepConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.err());
        let cfg = cfg.ok();
        assert_eq!(cfg.as_ref().map(|c| c.run.minimum_timestep), Some(15));
        assert_eq!(cfg.as_ref().map(|c| c.run.v_source), Some(Some(7200.0)));
        assert_eq!(cfg.as_ref().map(|c| c.switches.banked), Some(true));
        assert!(cfg.as_ref().is_some_and(|c| c.validate().is_empty()));
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml = r#"
[solar]
remove_all = true
"#;
        let cfg = PrepConfig::from_toml_str(toml).ok();
        assert_eq!(cfg.as_ref().map(|c| c.solar.remove_all), Some(true));
        assert_eq!(cfg.as_ref().map(|c| c.run.minimum_timestep), Some(60));
        assert_eq!(cfg.as_ref().map(|c| c.switches.normalize), Some(false));
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[run]
enabled = true
bogus_field = 1
"#;
        assert!(PrepConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn validation_catches_bad_timestamp() {
        let mut cfg = PrepConfig::runnable();
        cfg.clock.starttime = Some("January 1st".to_string());
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "clock.starttime"));
    }

    #[test]
    fn validation_catches_reversed_clock() {
        let mut cfg = PrepConfig::runnable();
        cfg.clock.stoptime = Some("2019-12-31 00:00:00".to_string());
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "clock.stoptime"));
    }

    #[test]
    fn validation_requires_clock_for_run() {
        let mut cfg = PrepConfig::passthrough();
        cfg.run.enabled = true;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "run.enabled"));
    }

    #[test]
    fn validation_catches_zero_timestep_and_bad_voltage() {
        let mut cfg = PrepConfig::runnable();
        cfg.run.minimum_timestep = 0;
        cfg.run.v_source = Some(-1.0);
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "run.minimum_timestep"));
        assert!(errors.iter().any(|e| e.field == "run.v_source"));
    }

    #[test]
    fn validation_catches_banked_without_normalize() {
        let mut cfg = PrepConfig::passthrough();
        cfg.switches.banked = true;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "switches.banked"));
    }

    #[test]
    fn clock_accessors_parse() {
        let cfg = PrepConfig::runnable();
        let start = cfg.clock.start().ok().flatten();
        assert_eq!(
            start.map(|t| t.format(DATE_FORMAT).to_string()),
            Some("2020-01-01 00:00:00".to_string())
        );
    }
}
