//! Output formatting for CLI

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// Render a list of items in `format`
pub fn render_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) -> String {
    if items.is_empty() {
        return "No items found.".to_string();
    }

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }

            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(items).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(items).unwrap_or_default(),
        OutputFormat::Plain => items
            .iter()
            .map(|item| {
                T::headers()
                    .iter()
                    .zip(item.row())
                    .map(|(header, value)| format!("{}: {}", header, value))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n---\n"),
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    println!("{}", render_list(items, format));
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        name: String,
        value: u32,
    }

    impl TableDisplay for Row {
        fn headers() -> Vec<&'static str> {
            vec!["Name", "Value"]
        }

        fn row(&self) -> Vec<String> {
            vec![self.name.clone(), self.value.to_string()]
        }
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { name: "a".to_string(), value: 1 },
            Row { name: "b".to_string(), value: 2 },
        ]
    }

    #[test]
    fn plain_output_separates_items() {
        assert_eq!(
            render_list(&rows(), OutputFormat::Plain),
            "Name: a\nValue: 1\n---\nName: b\nValue: 2"
        );
    }

    #[test]
    fn json_and_yaml_serialize_the_items() {
        let json: serde_json::Value = serde_json::from_str(&render_list(&rows(), OutputFormat::Json)).unwrap();
        assert_eq!(json[1]["name"], "b");
        assert!(render_list(&rows(), OutputFormat::Yaml).contains("value: 2"));
    }

    #[test]
    fn table_has_headers_and_rows() {
        let table = render_list(&rows(), OutputFormat::Table);
        assert!(table.contains("Name") && table.contains("Value"));
        assert!(table.contains('b'));
    }

    #[test]
    fn empty_lists_say_so() {
        assert_eq!(render_list::<Row>(&[], OutputFormat::Json), "No items found.");
    }
}
