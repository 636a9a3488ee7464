use crate::command::*;
use crate::error::{IndexError, Result};
use crate::hash_storage::HashStorage;
use crate::record::{Fields, Value};
use crate::schema::FieldType;
use crate::consts::DELETED_FIELD;

/// Runs a command against the index and renders what the user should see
pub fn execute_command(storage: &mut HashStorage, cmd: Command) -> Result<String> {
    match cmd {
        Command::Put(PutCommand(assignments)) => {
            let mut fields = Fields::new();
            for (name, text) in assignments {
                let value = field_value(storage, &name, &text)?;
                fields.insert(name, value);
            }
            storage.insert(fields)?;
            Ok("OK".to_string())
        }
        Command::Get(GetCommand(text)) => {
            let key = key_value(storage, &text)?;
            let found = storage.find(&key)?;
            if found.is_empty() {
                Ok("Key not found".to_string())
            } else {
                Ok(render_rows(&found))
            }
        }
        Command::Delete(DeleteCommand(text)) => {
            let key = key_value(storage, &text)?;
            match storage.remove(&key)? {
                Some(removed) => Ok(format!("Deleted {} record(s)", removed.len())),
                None => Ok("Key not found".to_string()),
            }
        }
        Command::Scan => {
            let rows = storage.all_records()?;
            if rows.is_empty() {
                Ok("(empty)".to_string())
            } else {
                Ok(render_rows(&rows))
            }
        }
        Command::Stats => {
            let stats = storage.stats()?;
            Ok(format!(
                "global depth: {}\ndirectory entries: {}\nbuckets: {}\npages allocated: {}\nrecords: {}\nreads: {}\nwrites: {}",
                stats.global_depth,
                stats.directory_len,
                stats.distinct_buckets,
                stats.next_page_idx,
                stats.records,
                stats.reads,
                stats.writes
            ))
        }
        Command::Verify => {
            let report = storage.verify()?;
            if report.is_clean() {
                Ok(format!(
                    "OK: {} buckets, {} records, longest chain {}",
                    report.buckets, report.records, report.longest_chain
                ))
            } else {
                Ok(report.violations.join("\n"))
            }
        }
        Command::Exit => Ok(String::new()),
    }
}

fn field_value(storage: &HashStorage, name: &str, text: &str) -> Result<Value> {
    if name == DELETED_FIELD {
        return Value::parse_as(FieldType::Bool, text);
    }
    let field = storage
        .schema()
        .field(name)
        .ok_or_else(|| IndexError::Schema(format!("unknown field {name}")))?;
    Value::parse_as(field.ty, text)
}

fn key_value(storage: &HashStorage, text: &str) -> Result<Value> {
    field_value(storage, storage.key_field(), text)
}

pub fn render_fields(fields: &Fields) -> String {
    let parts: Vec<String> = fields
        .iter()
        .map(|(name, value)| format!("{name}: {value}"))
        .collect();
    format!("{{{}}}", parts.join(", "))
}

fn render_rows(rows: &[Fields]) -> String {
    rows.iter().map(render_fields).collect::<Vec<_>>().join("\n")
}
