//! Table output formatting

use tabled::{
    Table, Tabled,
    builder::Builder,
    settings::{Alignment, Modify, Style, object::Rows},
};

use crate::client::Record;

/// Longest cell rendered before truncation
const MAX_CELL_WIDTH: usize = 48;

/// Format data as a table
pub fn format_table<T: Tabled>(data: &[T]) -> String {
    if data.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new(data);
    style(&mut table);
    table.to_string()
}

/// Format schemaless records; columns are the union of their fields, `id` first.
pub fn format_records(records: &[Record]) -> String {
    if records.is_empty() {
        return "No results found.".to_string();
    }

    let columns = record_columns(records);
    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(|c| c.to_uppercase()));
    for record in records {
        builder.push_record(columns.iter().map(|c| cell(record.get(c))));
    }

    let mut table = builder.build();
    style(&mut table);
    table.to_string()
}

fn style(table: &mut Table) {
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));
}

fn record_columns(records: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        if let Some(obj) = record.as_object() {
            for key in obj.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }
    if let Some(pos) = columns.iter().position(|c| c == "id") {
        let id = columns.remove(pos);
        columns.insert(0, id);
    }
    columns
}

fn cell(value: Option<&serde_json::Value>) -> String {
    let text = match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    if text.chars().count() > MAX_CELL_WIDTH {
        let truncated: String = text.chars().take(MAX_CELL_WIDTH - 1).collect();
        format!("{}…", truncated)
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Tabled)]
    struct TestRow {
        #[tabled(rename = "KEY")]
        key: String,
        #[tabled(rename = "VALUE")]
        value: String,
    }

    #[test]
    fn test_format_table_empty() {
        let items: Vec<TestRow> = vec![];
        assert_eq!(format_table(&items), "No results found.");
    }

    #[test]
    fn test_format_table_uses_rounded_style() {
        let items = vec![TestRow {
            key: "entries".to_string(),
            value: "3".to_string(),
        }];

        let result = format_table(&items);
        assert!(result.contains("KEY"));
        assert!(result.contains("entries"));
        assert!(result.contains('╭'));
    }

    #[test]
    fn test_format_records_puts_id_first() {
        let records = vec![
            json!({"name": "Edge One", "id": "e1"}),
            json!({"id": "e2", "location": "lab"}),
        ];

        let result = format_records(&records);
        let header = result.lines().nth(1).unwrap();
        let id_pos = header.find("ID").unwrap();
        assert!(id_pos < header.find("NAME").unwrap());
        assert!(header.contains("LOCATION"));
        assert!(result.contains("Edge One"));
        assert!(result.contains("lab"));
    }

    #[test]
    fn test_long_cells_are_truncated() {
        let long = "x".repeat(100);
        let result = format_records(&[json!({"id": "a", "blob": long})]);
        assert!(!result.contains(&"x".repeat(60)));
        assert!(result.contains('…'));
    }

    #[test]
    fn test_format_records_empty() {
        assert_eq!(format_records(&[]), "No results found.");
    }
}
