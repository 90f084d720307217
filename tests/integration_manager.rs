//! Integration tests for manager queries and edits on a realistic feeder.

mod common;

use glm_manager::glm::entity::{Clock, Entity, Module, Object};
use glm_manager::manager::helpers::{Phase, SwitchState};
use glm_manager::manager::{ItemKind, Listing, Selector};
use glm_manager::{ItemId, ModelError};

#[test]
fn queries_cover_every_kind() {
    let mgr = common::feeder();

    assert!(mgr.module_present("powerflow"));
    assert!(mgr.module_present("tape"));
    assert!(!mgr.module_present("generators"));
    assert!(mgr.object_type_present("triplex_load"));
    assert_eq!(mgr.clock().and_then(|c| c.timezone.as_deref()), Some("EST+5EDT"));
    assert_eq!(
        mgr.find_object("substation", "\"sourcebus\"").and_then(|s| s.get("bustype")),
        Some("SWING")
    );
    assert!(matches!(
        mgr.list_by_type(ItemKind::Schedule),
        Some(Listing::Schedules(s)) if s.contains_key("residential_cooling")
    ));
    assert!(matches!(
        mgr.list_by_type(ItemKind::Unnamed),
        Some(Listing::Unnamed(objects)) if objects.len() == 1
    ));
    assert!(mgr.list_by_type(ItemKind::Object("house")).is_none());

    let counts = mgr.object_counts();
    assert_eq!(counts.get("node"), Some(&1));
    assert_eq!(counts.get("recorder"), Some(&1));
    assert_eq!(counts.len(), 14);
}

#[test]
fn additions_keep_objects_last_and_globals_first() {
    let mut mgr = common::feeder();
    let before_first = mgr.model().first_key();
    let before_last = mgr.model().last_key();

    let module_key = mgr.add(Module::new("generators")).expect("module should be added");
    let object_key = mgr
        .add(Object::new("meter").with("name", "m_new").with("parent", "n632"))
        .expect("object should be added");

    assert!(before_first.is_some_and(|k| module_key < k));
    assert!(before_last.is_some_and(|k| object_key > k));
    assert_eq!(mgr.model().first_key(), Some(module_key));
    assert_eq!(mgr.model().last_key(), Some(object_key));
    assert!(mgr.render().starts_with("module generators;\n"));
}

#[test]
fn identity_conflicts_are_rejected() {
    let mut mgr = common::feeder();

    let err = mgr.add(Object::new("node").with("name", "n632")).unwrap_err();
    assert!(err.is_item_exists());
    let err = mgr.add(Module::new("tape")).unwrap_err();
    assert!(err.is_item_exists());
    let err = mgr
        .add(Clock::new("'2020-01-01 00:00:00'", "'2020-01-02 00:00:00'", "UTC0"))
        .unwrap_err();
    assert!(matches!(err, ModelError::ItemExists(ItemId::Clock)));

    // Same name under a different type is fine.
    assert!(mgr.add(Object::new("meter").with("name", "n632")).is_ok());
}

#[test]
fn modify_and_remove_fields() {
    let mut mgr = common::feeder();
    let node = Selector::object("node", "n632");

    mgr.modify(&node, [("nominal_voltage", "2401"), ("bustype", "PQ")])
        .expect("modify should succeed");
    let updated = mgr.find_object("node", "n632").expect("node");
    assert_eq!(updated.get("nominal_voltage"), Some("2401"));
    assert_eq!(updated.get("bustype"), Some("PQ"));

    let err = mgr.modify(&node, [("name", "renamed")]).unwrap_err();
    assert!(matches!(err, ModelError::Invalid(_)));

    mgr.remove_fields(&node, &["bustype", "not_there"])
        .expect("remove_fields should succeed");
    assert!(mgr.find_object("node", "n632").and_then(|n| n.get("bustype")).is_none());

    mgr.modify(&Selector::Module("powerflow".to_string()), [("solver_method", "NR")])
        .expect("module modify should succeed");
    assert_eq!(
        mgr.find_module("powerflow")
            .and_then(|m| m.properties.get("solver_method"))
            .map(String::as_str),
        Some("NR")
    );

    let err = mgr
        .modify(&Selector::Class("player".to_string()), [("x", "y")])
        .unwrap_err();
    assert!(matches!(err, ModelError::Invalid(_)));
}

#[test]
fn cascade_removes_descendants() {
    let mut mgr = common::feeder();
    let removed = mgr
        .remove_with_dependents("triplex_meter", "tm1")
        .expect("cascade should succeed");

    let described: Vec<String> = removed.iter().map(Entity::describe).collect();
    assert_eq!(
        described,
        vec![
            "triplex_meter object tm1",
            "unnamed recorder object",
            "triplex_load object tl1",
            "inverter object inv1",
            "solar object pv1",
        ]
    );
    assert!(mgr.find_object("solar", "pv1").is_none());
    assert!(matches!(
        mgr.list_by_type(ItemKind::Object("inverter")),
        Some(listing) if listing.is_empty()
    ));
    assert!(
        mgr.remove(&Selector::object("triplex_meter", "tm1"))
            .unwrap_err()
            .is_not_found()
    );
}

#[test]
fn equipment_helpers_update_settings() {
    let mut mgr = common::feeder();

    mgr.update_reg_taps("reg1", &[(Phase::A, 4), (Phase::C, -2)])
        .expect("taps should update");
    let cfg = mgr.find_object("regulator_configuration", "reg_cfg").expect("config");
    assert_eq!(cfg.get("tap_pos_A"), Some("4"));
    assert_eq!(cfg.get("tap_pos_B"), Some("1"));
    assert_eq!(cfg.get("tap_pos_C"), Some("-2"));

    mgr.update_cap_switches("cap1", &[(Phase::B, SwitchState::Open)])
        .expect("cap switches should update");
    let cap = mgr.find_object("capacitor", "cap1").expect("capacitor");
    assert_eq!(cap.get("switchA"), Some("CLOSED"));
    assert_eq!(cap.get("switchB"), Some("OPEN"));

    assert_eq!(mgr.convert_switch_status_to_three_phase(false).ok(), Some(1));
    let switch = mgr.find_object("switch", "sw1").expect("switch");
    assert!(switch.get("status").is_none());
    assert_eq!(switch.get("phase_C_state"), Some("OPEN"));
    assert_eq!(switch.get("operating_mode"), Some("INDIVIDUAL"));
}
