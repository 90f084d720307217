//! Applies a [`PrepConfig`] recipe to a loaded model.

use tracing::{info, warn};

use crate::config::{ConfigError, PrepConfig};
use crate::error::ModelError;
use crate::manager::GlmManager;
use crate::manager::helpers::RunComponents;

/// What a recipe changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepReport {
    /// Name of the meter inserted below the substation.
    pub substation_meter: Option<String>,
    pub solar_removed: usize,
    pub triplex_cleared: usize,
    pub inverters_sized: usize,
    pub switches_converted: usize,
    pub run_components: bool,
    pub clock_updated: bool,
}

fn config_error(e: ConfigError) -> ModelError {
    ModelError::Invalid(e.to_string())
}

/// Runs every enabled step of `config` against `manager`.
///
/// Steps run in a fixed order: substation meter, solar removal, triplex
/// clearing, inverter DC source, switch normalization, then run components
/// (or the bare clock when run components are disabled).
///
/// # Errors
///
/// Returns `ModelError::Invalid` if the recipe fails validation; nothing is
/// changed in that case. Errors from individual steps are propagated and
/// leave earlier steps applied.
pub fn apply(manager: &mut GlmManager, config: &PrepConfig) -> Result<PrepReport, ModelError> {
    let errors = config.validate();
    if !errors.is_empty() {
        let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
        return Err(ModelError::Invalid(joined.join("; ")));
    }

    let mut report = PrepReport::default();

    if config.substation.add_meter {
        report.substation_meter = Some(manager.add_substation_meter()?);
    }
    if config.solar.remove_all {
        report.solar_removed = manager.remove_all_solar()?;
    }
    if config.loads.clear_triplex {
        report.triplex_cleared = manager.clear_all_triplex_loads()?;
    }
    if config.inverters.set_dc_source {
        if manager.object_type_present("inverter") {
            report.inverters_sized = manager.set_inverter_v_and_i()?;
        } else {
            warn!("no inverters present, skipping DC source sizing");
        }
    }
    if config.switches.normalize {
        report.switches_converted =
            manager.convert_switch_status_to_three_phase(config.switches.banked)?;
    }

    let clock = &config.clock;
    let start = clock.start().map_err(config_error)?;
    let stop = clock.stop().map_err(config_error)?;
    if config.run.enabled {
        // Validation guarantees both times when run components are enabled.
        let (Some(start), Some(stop)) = (start, stop) else {
            return Err(ModelError::Invalid(
                "run components need clock.starttime and clock.stoptime".to_string(),
            ));
        };
        let mut run = RunComponents::new(start, stop);
        if let Some(tz) = &clock.timezone {
            run.timezone = tz.clone();
        }
        run.v_source = config.run.v_source;
        run.profiler = config.run.profiler;
        run.minimum_timestep = config.run.minimum_timestep;
        manager.add_run_components(&run)?;
        report.run_components = true;
        report.clock_updated = true;
    } else if clock.is_set() {
        manager.add_or_modify_clock(start, stop, clock.timezone.as_deref())?;
        report.clock_updated = true;
    }

    info!(?report, "recipe applied");
    Ok(report)
}
