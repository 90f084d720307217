//! Writer: renders a [`Model`] back to model text.
//!
//! Entities are emitted in ascending key order. Nested objects (present only
//! in models that were never un-nested) are rendered inline inside their
//! enclosing object. The output of [`render`] always parses back to an equal
//! model, with the single exception of identifiers truncated to
//! [`MAX_NAME_LEN`].

use std::fs;
use std::io;
use std::path::Path;

use tracing::warn;

use crate::glm::entity::{ClassDef, Clock, Directive, Entity, Model, Module, Object, Schedule};

/// Longest `name`/`parent` value the simulator accepts.
pub const MAX_NAME_LEN: usize = 64;

/// Renders the whole model.
///
/// # Examples
///
/// ```
/// use glm_manager::glm::entity::{Model, Object};
/// use glm_manager::glm::writer::render;
///
/// let mut model = Model::new();
/// model.insert(0, Object::new("meter").with("name", "m1").into());
/// assert_eq!(render(&model), "object meter {\n\tname m1;\n};\n\n");
/// ```
pub fn render(model: &Model) -> String {
    let nested = model.nested_keys();
    let mut out = String::new();
    for (key, entity) in model.iter() {
        if nested.contains(&key) {
            continue;
        }
        render_entity(model, entity, &mut out);
        out.push('\n');
    }
    out
}

/// Renders the model and writes it to `path`.
///
/// # Errors
///
/// Returns an `io::Error` if the file cannot be written.
pub fn write_file(model: &Model, path: &Path) -> io::Result<()> {
    fs::write(path, render(model))
}

fn render_entity(model: &Model, entity: &Entity, out: &mut String) {
    match entity {
        Entity::Directive(d) => render_directive(d, out),
        Entity::Module(m) => render_module(m, out),
        Entity::Clock(c) => render_clock(c, out),
        Entity::Class(c) => render_class(c, out),
        Entity::Schedule(s) => render_schedule(s, out),
        Entity::Object(o) => render_object(model, o, 0, out),
    }
}

fn render_directive(directive: &Directive, out: &mut String) {
    if directive.argument.is_empty() {
        out.push_str(&format!("{}\n", directive.kind));
    } else {
        out.push_str(&format!("{} {};\n", directive.kind, directive.argument));
    }
}

fn render_module(module: &Module, out: &mut String) {
    if module.properties.is_empty() {
        out.push_str(&format!("module {};\n", module.name));
        return;
    }
    out.push_str(&format!("module {} {{\n", module.name));
    for (key, value) in &module.properties {
        render_property(key, value, 1, out);
    }
    out.push_str("}\n");
}

/// The simulator reads timezone before the start and stop times.
fn render_clock(clock: &Clock, out: &mut String) {
    out.push_str("clock {\n");
    let fields = [
        ("timezone", &clock.timezone),
        ("starttime", &clock.starttime),
        ("stoptime", &clock.stoptime),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            render_property(key, value, 1, out);
        }
    }
    for (key, value) in &clock.extra {
        render_property(key, value, 1, out);
    }
    out.push_str("}\n");
}

fn render_class(class: &ClassDef, out: &mut String) {
    if class.variable_types.len() != class.variable_names.len() {
        warn!(
            class = %class.name,
            types = class.variable_types.len(),
            names = class.variable_names.len(),
            "class member lists differ in length, writing paired members only"
        );
    }
    out.push_str(&format!("class {} {{\n", class.name));
    for (var_type, var_name) in class.variable_types.iter().zip(&class.variable_names) {
        out.push_str(&format!("\t{var_type} {var_name};\n"));
    }
    out.push_str("}\n");
}

fn render_schedule(schedule: &Schedule, out: &mut String) {
    out.push_str(&format!("schedule {} {{\n", schedule.name));
    for line in schedule.cron_body.lines().filter(|l| !l.trim().is_empty()) {
        out.push_str(&format!("\t{line}\n"));
    }
    out.push_str("}\n");
}

fn render_object(model: &Model, object: &Object, depth: usize, out: &mut String) {
    let indent = "\t".repeat(depth);
    out.push_str(&format!("{indent}object {} {{\n", object.type_name));
    for (key, value) in &object.properties {
        render_property(key, value, depth + 1, out);
    }
    for child in &object.children {
        if let Some(Entity::Object(nested)) = model.get(*child) {
            render_object(model, nested, depth + 1, out);
        }
    }
    out.push_str(&format!("{indent}}};\n"));
}

fn render_property(key: &str, value: &str, depth: usize, out: &mut String) {
    let indent = "\t".repeat(depth);
    if key == "comment" && value.starts_with("//") {
        out.push_str(&format!("{indent}{value}\n"));
        return;
    }
    if key.starts_with('#') {
        if value.is_empty() {
            out.push_str(&format!("{indent}{key}\n"));
        } else {
            out.push_str(&format!("{indent}{key} {value}\n"));
        }
        return;
    }
    if matches!(key, "name" | "parent") && value.chars().count() > MAX_NAME_LEN {
        let truncated = truncate_name(value);
        warn!(
            %key,
            original = %value,
            %truncated,
            "identifier exceeds {} characters, truncating",
            MAX_NAME_LEN
        );
        out.push_str(&format!(
            "{indent}{key} {truncated}; // truncated from {value}\n"
        ));
        return;
    }
    out.push_str(&format!("{indent}{key} {value};\n"));
}

/// Cuts an identifier to [`MAX_NAME_LEN`] characters, keeping a closing
/// double quote last.
fn truncate_name(value: &str) -> String {
    let quoted = value.len() > 1 && value.starts_with('"') && value.ends_with('"');
    if !quoted {
        return value.chars().take(MAX_NAME_LEN).collect();
    }
    let mut truncated: String = value.chars().take(MAX_NAME_LEN - 1).collect();
    truncated.push('"');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glm::entity::DirectiveKind;
    use crate::glm::parser::{build_tree, parse_str};
    use crate::glm::token::tokenize;

    #[test]
    fn clock_fields_use_fixed_order() {
        let mut clock = Clock::default();
        clock.stoptime = Some("'2020-01-02 00:00:00'".to_string());
        clock.starttime = Some("'2020-01-01 00:00:00'".to_string());
        clock.timezone = Some("PST+8PDT".to_string());
        clock.extra.insert("timestamp".to_string(), "'2020-01-01 00:00:00'".to_string());
        let mut model = Model::new();
        model.insert(0, clock.into());

        assert_eq!(
            render(&model),
            "clock {\n\ttimezone PST+8PDT;\n\tstarttime '2020-01-01 00:00:00';\n\tstoptime '2020-01-02 00:00:00';\n\ttimestamp '2020-01-01 00:00:00';\n}\n\n"
        );
    }

    #[test]
    fn directives_and_modules() {
        let mut model = Model::new();
        model.insert(0, Directive::new(DirectiveKind::Set, "profiler=1").into());
        model.insert(1, Directive::new(DirectiveKind::Endif, "").into());
        model.insert(2, Module::new("tape").into());
        model.insert(3, Module::new("powerflow").with("solver_method", "NR").into());

        assert_eq!(
            render(&model),
            "#set profiler=1;\n\n#endif\n\nmodule tape;\n\nmodule powerflow {\n\tsolver_method NR;\n}\n\n"
        );
    }

    #[test]
    fn long_identifiers_are_truncated_with_a_note() {
        let long = "n".repeat(70);
        let mut model = Model::new();
        model.insert(0, Object::new("node").with("name", long.as_str()).into());
        let text = render(&model);
        let expected = format!("\tname {}; // truncated from {long}\n", "n".repeat(64));
        assert!(text.contains(&expected), "{text}");

        let reparsed = parse_str(&text).expect("truncated output parses");
        let node = reparsed.get(0).and_then(Entity::as_object).expect("object");
        assert_eq!(node.name().map(str::len), Some(MAX_NAME_LEN));
    }

    #[test]
    fn quoted_identifiers_keep_their_closing_quote() {
        let long = format!("\"{}\"", "q".repeat(70));
        let mut model = Model::new();
        model.insert(0, Object::new("node").with("name", long.as_str()).into());
        let text = render(&model);
        let expected = format!("\tname \"{}\"; // truncated from {long}\n", "q".repeat(62));
        assert!(text.contains(&expected), "{text}");

        let reparsed = parse_str(&text).expect("truncated output parses");
        let name = reparsed
            .get(0)
            .and_then(Entity::as_object)
            .and_then(Object::name)
            .expect("name");
        assert_eq!(name.chars().count(), MAX_NAME_LEN);
        assert!(name.starts_with('"') && name.ends_with('"'), "{name}");
    }

    #[test]
    fn directive_lines_inside_a_body_round_trip() {
        let text = "object node {\n name a;\n#ifdef X\n phases A;\n#endif\n}";
        let model = parse_str(text).expect("parse");
        let rendered = render(&model);
        assert!(rendered.contains("\t#ifdef X\n\tphases A;\n\t#endif\n"), "{rendered}");

        let reparsed = parse_str(&rendered).expect("rendered model parses");
        assert_eq!(reparsed, model);
        assert_eq!(render(&reparsed), rendered);
    }

    #[test]
    fn comment_lines_are_written_verbatim() {
        let mut model = Model::new();
        model.insert(
            0,
            Object::new("node")
                .with("name", "n")
                .with("comment", "// added by prep")
                .into(),
        );
        assert_eq!(
            render(&model),
            "object node {\n\tname n;\n\t// added by prep\n};\n\n"
        );
    }

    #[test]
    fn class_and_schedule() {
        let mut model = Model::new();
        model.insert(0, ClassDef::new("player").with_member("double", "value").into());
        model.insert(
            1,
            Schedule {
                name: "s".to_string(),
                cron_body: "* 0-5 * * * 0.5;\n* 6-23 * * * 1.0;".to_string(),
            }
            .into(),
        );
        assert_eq!(
            render(&model),
            "class player {\n\tdouble value;\n}\n\nschedule s {\n\t* 0-5 * * * 0.5;\n\t* 6-23 * * * 1.0;\n}\n\n"
        );
    }

    #[test]
    fn nested_children_render_inline() {
        let tree = build_tree(tokenize(
            "object house { name h; object recorder { interval 60; }; }",
        ))
        .expect("build");
        assert_eq!(
            render(&tree.model),
            "object house {\n\tname h;\n\tobject recorder {\n\t\tinterval 60;\n\t};\n};\n\n"
        );
    }

    #[test]
    fn render_is_a_parse_fixed_point() {
        let text = "#set relax_naming_rules=1;\nmodule powerflow { solver_method NR; }\nclock { stoptime '2020-01-02 00:00:00'; timezone EST+5EDT; starttime '2020-01-01 00:00:00'; }\nschedule s { weekday { * * * * 1-5 1; } }\nobject overhead_line { name ol; configuration object line_configuration { conductor_A c; }; }\nobject house { name h; object recorder { interval 60; }; }\nobject load:4 { parent node:1; }";
        let first = parse_str(text).expect("first parse");
        let second = parse_str(&render(&first)).expect("second parse");
        assert_eq!(first, second);
    }

    #[test]
    fn write_file_persists_render() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("out.glm");
        let model = parse_str("module tape;").expect("parse");
        write_file(&model, &path).expect("write should succeed");
        assert_eq!(fs::read_to_string(&path).expect("read"), "module tape;\n\n");
    }
}
