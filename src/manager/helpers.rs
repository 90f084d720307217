//! Domain helpers for preparing feeder models to run.
//!
//! Every helper here is composed from the manager's public primitives
//! (`find`, `get_objects_by_type`, `add`, `modify`, `remove`,
//! `remove_fields` and `for_each_object_of_type`). None of them carries
//! invariants of its own beyond "the referenced objects must exist".

use std::fmt;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use tracing::{info, warn};

use crate::error::{ItemId, ModelError};
use crate::glm::entity::{
    Clock, Directive, DirectiveKind, EntityKey, Module, Object, Properties,
};
use crate::glm::parser::suffixed_name;
use crate::manager::{GlmManager, Selector};

/// Timestamp layout used by clock fields (wrapped in single quotes).
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Object types served by the `generators` module.
pub const GEN_CLASSES: &[&str] = &[
    "inverter",
    "battery",
    "diesel_dg",
    "dc_dc_converter",
    "energy_storage",
    "microturbine",
    "power_electronics",
    "rectifier",
    "solar",
    "windturb_dg",
];

/// Load parameters of `triplex_load` objects.
pub const TRIPLEX_PARAMS: &[&str] = &[
    "base_power_1",
    "base_power_2",
    "base_power_12",
    "power_pf_1",
    "power_pf_2",
    "power_pf_12",
    "current_pf_1",
    "current_pf_2",
    "current_pf_12",
    "impedance_pf_1",
    "impedance_pf_2",
    "impedance_pf_12",
    "power_fraction_1",
    "power_fraction_2",
    "power_fraction_12",
    "current_fraction_1",
    "current_fraction_2",
    "current_fraction_12",
    "impedance_fraction_1",
    "impedance_fraction_2",
    "impedance_fraction_12",
];

/// DC input voltage given to inverters with a known rating.
const INVERTER_V_IN: f64 = 1000.0;
/// The DC source supplies this multiple of the inverter rating.
const DC_SUPPLY_FACTOR: f64 = 1.1;
/// `V_In` and `I_In` for inverters without a usable `rated_power`.
const INVERTER_FALLBACK_V_AND_I: f64 = 10000.0;

/// One of the three power phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    A,
    B,
    C,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::A, Phase::B, Phase::C];

    pub fn as_char(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            'C' => Some(Self::C),
            _ => None,
        }
    }

    /// Whether a `phases` property value (e.g. `ABCN`) includes this phase.
    fn in_phases(self, phases: &str) -> bool {
        phases.contains(self.as_char())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Capacitor switch position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    Open,
    Closed,
}

impl SwitchState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renders a timestamp the way clock fields expect it: `'2020-01-01 00:00:00'`.
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    format!("'{}'", timestamp.format(DATE_FORMAT))
}

/// Inputs for [`GlmManager::add_run_components`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunComponents {
    pub starttime: NaiveDateTime,
    pub stoptime: NaiveDateTime,
    pub timezone: String,
    /// Swing bus voltage; taken from the substation when `None`.
    pub v_source: Option<f64>,
    pub profiler: bool,
    /// Seconds.
    pub minimum_timestep: u32,
}

impl RunComponents {
    pub fn new(starttime: NaiveDateTime, stoptime: NaiveDateTime) -> Self {
        Self {
            starttime,
            stoptime,
            timezone: "UTC0".to_string(),
            v_source: None,
            profiler: false,
            minimum_timestep: 60,
        }
    }
}

impl GlmManager {
    /// Sets clock fields, adding the clock if the model has none.
    ///
    /// Fields passed as `None` are left alone on an existing clock.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::Invalid` if every argument is `None`, or if no
    /// clock exists yet and any argument is `None`.
    pub fn add_or_modify_clock(
        &mut self,
        starttime: Option<NaiveDateTime>,
        stoptime: Option<NaiveDateTime>,
        timezone: Option<&str>,
    ) -> Result<(), ModelError> {
        let mut fields: Vec<(&str, String)> = Vec::new();
        if let Some(t) = starttime {
            fields.push(("starttime", format_timestamp(&t)));
        }
        if let Some(t) = stoptime {
            fields.push(("stoptime", format_timestamp(&t)));
        }
        if let Some(tz) = timezone {
            fields.push(("timezone", tz.to_string()));
        }
        if fields.is_empty() {
            return Err(ModelError::Invalid("no clock fields given".to_string()));
        }

        if self.clock().is_some() {
            return self.modify(&Selector::Clock, fields);
        }
        let mut clock = Clock::default();
        for (key, value) in fields {
            if let Some(slot) = clock.field_mut(key) {
                *slot = Some(value);
            }
        }
        self.add(clock).map(|_| ())
    }

    /// Adds the module, or merges its properties into an existing one.
    fn ensure_module(&mut self, module: Module) -> Result<(), ModelError> {
        if self.module_present(&module.name) {
            let selector = Selector::Module(module.name.clone());
            return self.modify(&selector, module.properties);
        }
        self.add(module).map(|_| ())
    }

    /// Nominal voltage of the first substation.
    fn substation_voltage(&self) -> Result<f64, ModelError> {
        let substation = self
            .get_objects_by_type("substation")
            .and_then(|subs| subs.first().copied())
            .ok_or_else(|| ModelError::NotFound(ItemId::ObjectType("substation".to_string())))?;
        substation
            .get("nominal_voltage")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .ok_or_else(|| {
                ModelError::Invalid(format!(
                    "substation {} has no numeric nominal_voltage",
                    substation.name().unwrap_or("(unnamed)")
                ))
            })
    }

    /// Adds what a bare feeder export needs to run: the source voltage
    /// macro, the powerflow, generators and reliability modules, the
    /// fault-handling objects, global settings and the clock.
    ///
    /// Directives and modules are prepended, so they end up in reverse order
    /// of addition ahead of the original content.
    ///
    /// # Errors
    ///
    /// - `ModelError::NotFound` if no source voltage is given and the model
    ///   has no substation.
    /// - `ModelError::ItemExists` if the fault-handling objects already exist.
    ///
    /// Components added before a failure stay in the model.
    pub fn add_run_components(&mut self, run: &RunComponents) -> Result<(), ModelError> {
        let v_source = match run.v_source {
            Some(v) => v,
            None => self.substation_voltage()?,
        };

        self.add(Directive::new(DirectiveKind::Define, format!("VSOURCE={v_source}")))?;
        self.ensure_module(
            Module::new("powerflow")
                .with("solver_method", "NR")
                .with("line_capacitance", "TRUE"),
        )?;
        if GEN_CLASSES.iter().any(|g| self.object_type_present(g)) {
            self.ensure_module(Module::new("generators"))?;
        }

        // Meshed feeders need fault_check plus an event generator to solve.
        self.ensure_module(Module::new("reliability"))?;
        self.add(
            Object::new("fault_check")
                .with("name", "fault_check_object")
                .with("check_mode", "ONCHANGE")
                .with("eventgen_object", "external_event_handler")
                .with("strictly_radial", "FALSE")
                .with("grid_association", "TRUE"),
        )?;
        self.add(
            Object::new("eventgen")
                .with("name", "external_event_handler")
                .with("use_external_faults", "TRUE"),
        )?;

        let settings = [
            "suppress_repeat_messages=1".to_string(),
            "relax_naming_rules=1".to_string(),
            format!("profiler={}", u8::from(run.profiler)),
            format!("minimum_timestep={}", run.minimum_timestep),
        ];
        for setting in settings {
            self.add(Directive::new(DirectiveKind::Set, setting))?;
        }

        self.add_or_modify_clock(Some(run.starttime), Some(run.stoptime), Some(&run.timezone))?;
        info!(v_source, "run components added");
        Ok(())
    }

    /// Puts a meter between the swing substation and the rest of the feeder.
    ///
    /// Every `parent`, `from` or `to` reference to the substation is moved to
    /// a new meter named `<substation>_meter`, which is itself parented to
    /// the substation. Returns the meter's name.
    ///
    /// # Errors
    ///
    /// - `ModelError::NotFound` if the model has no named substation.
    /// - `ModelError::Invalid` if there is more than one substation or it is
    ///   not a SWING bus.
    pub fn add_substation_meter(&mut self) -> Result<String, ModelError> {
        let substations = self
            .get_objects_by_type("substation")
            .ok_or_else(|| ModelError::NotFound(ItemId::ObjectType("substation".to_string())))?;
        if substations.len() != 1 {
            return Err(ModelError::Invalid(format!(
                "expected exactly one substation, found {}",
                substations.len()
            )));
        }
        let substation = substations[0];
        if substation.get("bustype") != Some("SWING") {
            return Err(ModelError::Invalid(
                "the substation must be a SWING bus".to_string(),
            ));
        }

        let sub_name = substation.name().unwrap_or_default().to_string();
        let phases = substation.get("phases").map(str::to_string);
        let nominal_voltage = substation.get("nominal_voltage").map(str::to_string);
        let meter_name = suffixed_name(&sub_name, "_meter");

        let mut rewires: Vec<(EntityKey, &str)> = Vec::new();
        for (key, object) in self.model().objects() {
            for field in ["parent", "from", "to"] {
                if object.get(field) == Some(sub_name.as_str()) {
                    rewires.push((key, field));
                }
            }
        }
        for (key, field) in &rewires {
            self.modify(&Selector::Key(*key), [(*field, meter_name.as_str())])?;
        }

        let mut meter = Object::new("meter").with("name", &meter_name);
        if let Some(phases) = phases {
            meter = meter.with("phases", phases);
        }
        if let Some(voltage) = nominal_voltage {
            meter = meter.with("nominal_voltage", voltage);
        }
        self.add(meter.with("parent", &sub_name))?;
        info!(meter = %meter_name, rewired = rewires.len(), "substation meter added");
        Ok(meter_name)
    }

    /// Sets regulator tap positions on the regulator (`tap_X`) and its
    /// configuration (`tap_pos_X`).
    ///
    /// # Errors
    ///
    /// - `ModelError::NotFound` if the regulator or its configuration is missing.
    /// - `ModelError::Invalid` if a tap lies outside
    ///   `[-lower_taps, raise_taps]` or the regulator lacks a phase. Nothing is
    ///   changed in that case.
    pub fn update_reg_taps(&mut self, reg_name: &str, taps: &[(Phase, i32)]) -> Result<(), ModelError> {
        let regulator = self
            .find_object("regulator", reg_name)
            .ok_or_else(|| not_found_object("regulator", reg_name))?;
        let config_name = regulator
            .get("configuration")
            .ok_or_else(|| {
                ModelError::Invalid(format!("regulator {reg_name} has no configuration"))
            })?
            .to_string();
        let reg_phases = regulator.get("phases").unwrap_or_default();
        let config = self
            .find_object("regulator_configuration", &config_name)
            .ok_or_else(|| not_found_object("regulator_configuration", &config_name))?;
        let upper = int_property(config, "raise_taps")?;
        let lower = -int_property(config, "lower_taps")?;

        for &(phase, tap) in taps {
            if !(lower..=upper).contains(&tap) {
                return Err(ModelError::Invalid(format!(
                    "tap {tap} for phase {phase} is outside [{lower}, {upper}]"
                )));
            }
            if !phase.in_phases(reg_phases) {
                return Err(ModelError::Invalid(format!(
                    "regulator {reg_name} has no phase {phase}"
                )));
            }
        }

        let reg_updates: Vec<(String, String)> = taps
            .iter()
            .map(|(phase, tap)| (format!("tap_{phase}"), tap.to_string()))
            .collect();
        let config_updates: Vec<(String, String)> = taps
            .iter()
            .map(|(phase, tap)| (format!("tap_pos_{phase}"), tap.to_string()))
            .collect();
        self.modify(&Selector::object("regulator", reg_name), reg_updates)?;
        self.modify(
            &Selector::object("regulator_configuration", config_name),
            config_updates,
        )
    }

    /// Sets capacitor switch states (`switchX`).
    ///
    /// # Errors
    ///
    /// - `ModelError::NotFound` if the capacitor is missing.
    /// - `ModelError::Invalid` if the capacitor lacks one of the phases.
    pub fn update_cap_switches(
        &mut self,
        cap_name: &str,
        states: &[(Phase, SwitchState)],
    ) -> Result<(), ModelError> {
        let capacitor = self
            .find_object("capacitor", cap_name)
            .ok_or_else(|| not_found_object("capacitor", cap_name))?;
        let cap_phases = capacitor.get("phases").unwrap_or_default();
        if let Some((phase, _)) = states.iter().find(|(p, _)| !p.in_phases(cap_phases)) {
            return Err(ModelError::Invalid(format!(
                "capacitor {cap_name} has no phase {phase}"
            )));
        }
        let updates: Vec<(String, &str)> = states
            .iter()
            .map(|(phase, state)| (format!("switch{phase}"), state.as_str()))
            .collect();
        self.modify(&Selector::object("capacitor", cap_name), updates)
    }

    /// Strips every [`TRIPLEX_PARAMS`] field from every triplex load.
    /// Returns how many loads were cleared.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures from `remove_fields`.
    pub fn clear_all_triplex_loads(&mut self) -> Result<usize, ModelError> {
        let keys = self.keys_of_type("triplex_load");
        if keys.is_empty() {
            warn!("no triplex_load objects to clear");
            return Ok(0);
        }
        for &key in &keys {
            self.remove_fields(&Selector::Key(key), TRIPLEX_PARAMS)?;
        }
        info!(loads = keys.len(), "triplex loads cleared");
        Ok(keys.len())
    }

    /// Applies per-load parameter updates, keyed by triplex load name.
    ///
    /// # Errors
    ///
    /// - `ModelError::NotFound` if a named load does not exist.
    /// - `ModelError::Invalid` if an update names a field outside
    ///   [`TRIPLEX_PARAMS`]. Nothing is changed in either case.
    pub fn update_all_triplex_loads(
        &mut self,
        loads: &IndexMap<String, Properties>,
    ) -> Result<(), ModelError> {
        for (name, params) in loads {
            if self.find_object("triplex_load", name).is_none() {
                return Err(not_found_object("triplex_load", name));
            }
            if let Some(field) = params.keys().find(|k| !TRIPLEX_PARAMS.contains(&k.as_str())) {
                return Err(ModelError::Invalid(format!(
                    "{field} is not a triplex load parameter"
                )));
            }
        }
        for (name, params) in loads {
            let updates = params.iter().map(|(k, v)| (k.as_str(), v.as_str()));
            self.modify(&Selector::object("triplex_load", name.as_str()), updates)?;
        }
        Ok(())
    }

    /// Removes every solar object. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures from `remove`.
    pub fn remove_all_solar(&mut self) -> Result<usize, ModelError> {
        let keys = self.keys_of_type("solar");
        if keys.is_empty() {
            warn!("no solar objects to remove");
            return Ok(0);
        }
        for &key in &keys {
            self.remove(&Selector::Key(key))?;
        }
        info!(removed = keys.len(), "solar objects removed");
        Ok(keys.len())
    }

    /// Sizes each inverter's DC source (`V_In`, `I_In`) at 110% of its
    /// `rated_power`. Returns how many inverters were updated.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::NotFound` if the model has no inverters.
    pub fn set_inverter_v_and_i(&mut self) -> Result<usize, ModelError> {
        let updated = self.for_each_object_of_type("inverter", |inverter| {
            let rated = inverter
                .get("rated_power")
                .and_then(|s| s.trim().parse::<f64>().ok());
            let (v_in, i_in) = match rated {
                Some(rated) => (INVERTER_V_IN, rated * DC_SUPPLY_FACTOR / INVERTER_V_IN),
                None => {
                    warn!(
                        inverter = ?inverter.name(),
                        "no usable rated_power, falling back to V_In={0} I_In={0}",
                        INVERTER_FALLBACK_V_AND_I
                    );
                    (INVERTER_FALLBACK_V_AND_I, INVERTER_FALLBACK_V_AND_I)
                }
            };
            inverter
                .properties
                .insert("V_In".to_string(), v_in.to_string());
            inverter
                .properties
                .insert("I_In".to_string(), i_in.to_string());
        })?;
        info!(inverters = updated, "inverter DC sources sized");
        Ok(updated)
    }

    /// Replaces each switch's `status` with per-phase `phase_X_state`
    /// fields and sets its `operating_mode` (BANKED or INDIVIDUAL).
    /// Returns how many switches were converted.
    ///
    /// # Errors
    ///
    /// Never fails for a model without switches (that case is only logged);
    /// other errors from the iteration are propagated.
    pub fn convert_switch_status_to_three_phase(&mut self, banked: bool) -> Result<usize, ModelError> {
        let mode = if banked { "BANKED" } else { "INDIVIDUAL" };
        let result = self.for_each_object_of_type("switch", |switch| {
            let phases: Vec<Phase> = Phase::ALL
                .into_iter()
                .filter(|p| switch.get("phases").is_some_and(|ph| p.in_phases(ph)))
                .collect();
            let status = switch
                .properties
                .shift_remove("status")
                .unwrap_or_else(|| {
                    warn!(switch = ?switch.name(), "switch has no status, assuming CLOSED");
                    SwitchState::Closed.as_str().to_string()
                });
            for phase in phases {
                switch
                    .properties
                    .insert(format!("phase_{phase}_state"), status.clone());
            }
            switch
                .properties
                .insert("operating_mode".to_string(), mode.to_string());
        });
        match result {
            Ok(converted) => {
                info!(switches = converted, mode, "switch states converted to per-phase");
                Ok(converted)
            }
            Err(err) if err.is_not_found() => {
                warn!("no switches present, nothing to convert");
                Ok(0)
            }
            Err(err) => Err(err),
        }
    }

    fn keys_of_type(&self, type_name: &str) -> Vec<EntityKey> {
        self.model()
            .objects()
            .filter(|(_, o)| o.type_name == type_name)
            .map(|(k, _)| k)
            .collect()
    }
}

fn not_found_object(type_name: &str, name: &str) -> ModelError {
    ModelError::NotFound(ItemId::Object {
        type_name: type_name.to_string(),
        name: name.to_string(),
    })
}

fn int_property(object: &Object, field: &str) -> Result<i32, ModelError> {
    object
        .get(field)
        .and_then(|v| v.trim().parse::<i32>().ok())
        .ok_or_else(|| {
            ModelError::Invalid(format!(
                "{} {} has no integer {field}",
                object.type_name,
                object.name().unwrap_or("(unnamed)")
            ))
        })
}
