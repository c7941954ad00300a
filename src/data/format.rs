//! Data file formats

use crate::value::Value;

/// Recognized data file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Yaml,
    Json,
    Toml,
    /// One JSON record per line; the file yields a list of records
    JsonLines,
}

impl DataFormat {
    /// Format for a lowercase file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "yml" | "yaml" => Some(DataFormat::Yaml),
            "json" => Some(DataFormat::Json),
            "toml" => Some(DataFormat::Toml),
            "jsonl" | "ndjson" => Some(DataFormat::JsonLines),
            _ => None,
        }
    }

    /// Parse a whole file. The error message names the offending line for
    /// line-delimited files.
    pub fn parse(self, text: &str) -> Result<Value, String> {
        match self {
            DataFormat::Yaml => serde_yaml::from_str::<serde_yaml::Value>(text)
                .map(Value::from_yaml)
                .map_err(|e| e.to_string()),
            DataFormat::Json => serde_json::from_str::<serde_json::Value>(text)
                .map(Value::from_json)
                .map_err(|e| e.to_string()),
            DataFormat::Toml => text
                .parse::<toml::Table>()
                .map(|table| Value::from_toml(toml::Value::Table(table)))
                .map_err(|e| e.to_string()),
            DataFormat::JsonLines => text
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(index, line)| {
                    serde_json::from_str::<serde_json::Value>(line)
                        .map(Value::from_json)
                        .map_err(|e| format!("line {}: {}", index + 1, e))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
        }
    }
}
