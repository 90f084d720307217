//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use glm_manager::GlmManager;

/// Small feeder export with every entity kind the parser understands.
///
/// Keys in document order:
/// 0 `#set`, 1 `#include`, 2 powerflow module, 3 tape module, 4 clock,
/// 5 class, 6 schedule, 7 substation, 8 overhead_line,
/// 9 line_configuration (embedded in 8), 10 node, 11 regulator_configuration,
/// 12 regulator, 13 capacitor, 14 switch, 15 triplex_meter,
/// 16 recorder (nested in 15), 17 triplex_load, 18 inverter, 19 solar,
/// 20 fuse (legacy `fuse:7` syntax).
pub const FEEDER_GLM: &str = r#"// Exported feeder, trimmed for tests
#set relax_naming_rules=1;
#include "${DATA_DIR}/library.glm";

module powerflow {
    solver_method FBS;
}
module tape;

clock {
    timezone EST+5EDT;
    starttime '2019-07-01 00:00:00';
    stoptime '2019-07-02 00:00:00';
}

class player {
    double value;
}

schedule residential_cooling {
    weekday {
        * 0-5 * * 1-5 0.5;
    }
    * 6-23 * * * 1.0;
}

object substation {
    name "sourcebus";
    bustype SWING;
    phases ABCN;
    nominal_voltage 7200;
}

object overhead_line {
    name "line_650_632";
    phases ABCN;
    from "sourcebus";
    to n632;
    length 2000;
    configuration object line_configuration {
        conductor_A oh_conductor;
        spacing ls500;
    };
}

object node {
    name n632;
    phases ABCN;
    nominal_voltage 7200;
}

object regulator_configuration {
    name reg_cfg;
    raise_taps 16;
    lower_taps 16;
    tap_pos_A 1;
    tap_pos_B 1;
    tap_pos_C 1;
}

object regulator {
    name reg1;
    phases ABC;
    from n632;
    to n633;
    configuration reg_cfg;
}

object capacitor {
    name cap1;
    phases ABC;
    parent n632;
    switchA CLOSED;
    switchB CLOSED;
    switchC CLOSED;
}

object switch {
    name sw1;
    phases ABC;
    from n632;
    to n634;
    status OPEN;
}

object triplex_meter {
    name tm1;
    phases AS;
    nominal_voltage 120;
    object recorder {
        property measured_real_power;
        interval 60;
    };
}

object triplex_load {
    name tl1;
    parent tm1;
    phases AS;
    nominal_voltage 120;
    base_power_12 1500;
    power_pf_12 0.95;
    impedance_fraction_12 0.2;
}

object inverter {
    name inv1;
    parent tm1;
    rated_power 4000;
}

object solar {
    name pv1;
    parent inv1;
    rated_power 3500;
}

object fuse:7 {
    phases A;
    from n632;
    to n611;
}
"#;

/// Manager loaded from [`FEEDER_GLM`].
pub fn feeder() -> GlmManager {
    GlmManager::from_glm_str(FEEDER_GLM).expect("fixture feeder should load")
}

/// Writes [`FEEDER_GLM`] into `dir` and returns the file path.
pub fn write_feeder(dir: &Path) -> PathBuf {
    let path = dir.join("feeder.glm");
    fs::write(&path, FEEDER_GLM).expect("fixture should be written");
    path
}
