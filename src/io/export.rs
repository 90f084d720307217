//! CSV inventory of a model's entities.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::glm::entity::{Entity, Model, Properties};

/// Column header for the inventory export.
const HEADER: &str = "key,kind,type,name,parent,properties";

/// Exports the model inventory to a CSV file at the given path.
///
/// One row per entity in write order. Nested objects follow their
/// enclosing object since they share its key range.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_inventory(model: &Model, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_inventory(model, buf)
}

/// Writes the model inventory as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_inventory(model: &Model, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(HEADER.split(','))?;

    for (key, entity) in model.iter() {
        let row = InventoryRow::from_entity(entity);
        wtr.write_record([
            key.to_string(),
            entity.kind_label().to_string(),
            row.type_name,
            row.name,
            row.parent,
            row.properties,
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[derive(Default)]
struct InventoryRow {
    type_name: String,
    name: String,
    parent: String,
    properties: String,
}

impl InventoryRow {
    fn from_entity(entity: &Entity) -> Self {
        match entity {
            Entity::Directive(d) => Self {
                type_name: d.kind.keyword().to_string(),
                properties: d.argument.clone(),
                ..Self::default()
            },
            Entity::Module(m) => Self {
                name: m.name.clone(),
                properties: join_properties(&m.properties, &[]),
                ..Self::default()
            },
            Entity::Clock(c) => {
                let mut fields = Properties::new();
                for (key, value) in [
                    ("timezone", &c.timezone),
                    ("starttime", &c.starttime),
                    ("stoptime", &c.stoptime),
                ] {
                    if let Some(value) = value {
                        fields.insert(key.to_string(), value.clone());
                    }
                }
                fields.extend(c.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
                Self {
                    properties: join_properties(&fields, &[]),
                    ..Self::default()
                }
            }
            Entity::Class(c) => Self {
                name: c.name.clone(),
                properties: c
                    .variable_types
                    .iter()
                    .zip(&c.variable_names)
                    .map(|(t, n)| format!("{t} {n}"))
                    .collect::<Vec<_>>()
                    .join(";"),
                ..Self::default()
            },
            Entity::Schedule(s) => Self {
                name: s.name.clone(),
                properties: s.cron_body.lines().collect::<Vec<_>>().join(" "),
                ..Self::default()
            },
            Entity::Object(o) => Self {
                type_name: o.type_name.clone(),
                name: o.name().unwrap_or_default().to_string(),
                parent: o.parent().unwrap_or_default().to_string(),
                properties: join_properties(&o.properties, &["name", "parent"]),
            },
        }
    }
}

/// `key=value` pairs separated by `;`.
fn join_properties(properties: &Properties, skip: &[&str]) -> String {
    properties
        .iter()
        .filter(|(k, _)| !skip.contains(&k.as_str()))
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glm::parse_str;

    fn inventory(text: &str) -> String {
        let model = parse_str(text).ok().unwrap_or_default();
        let mut buf = Vec::new();
        write_inventory(&model, &mut buf).ok();
        String::from_utf8(buf).ok().unwrap_or_default()
    }

    #[test]
    fn header_matches_columns() {
        let output = inventory("");
        assert_eq!(output.lines().next(), Some(HEADER));
    }

    #[test]
    fn one_row_per_entity() {
        let output = inventory(
            "#set profiler=1;\nmodule powerflow { solver_method NR; }\nclock { timezone UTC0; }\nobject node { name n1; phases ABC; }\nobject load { name l1; parent n1; }",
        );
        let lines: Vec<&str> = output.lines().collect();
        // 1 header + 5 entities
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[1], "0,directive,#set,,,profiler=1");
        assert_eq!(lines[2], "1,module,,powerflow,,solver_method=NR");
        assert_eq!(lines[3], "2,clock,,,,timezone=UTC0");
        assert_eq!(lines[4], "3,object,node,n1,,phases=ABC");
        assert_eq!(lines[5], "4,object,load,l1,n1,");
    }

    #[test]
    fn quoted_values_survive_csv() {
        let model = parse_str("object meter { name \"m,1\"; }").ok().unwrap_or_default();
        let mut buf = Vec::new();
        write_inventory(&model, &mut buf).ok();

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let records: Vec<csv::StringRecord> = rdr.records().filter_map(Result::ok).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get(3), Some("\"m,1\""));
    }

    #[test]
    fn export_writes_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("inventory.csv");
        let model = parse_str("module tape;").expect("parse");
        export_inventory(&model, &path).expect("export should succeed");
        let text = std::fs::read_to_string(&path).expect("read");
        assert_eq!(text.lines().nth(1), Some("0,module,,tape,,"));
    }
}
