use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Output format selection for all subcommands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Single JSON object on stdout.
    Json,
    /// `key: value` lines on stdout.
    #[default]
    Human,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Human => write!(f, "human"),
        }
    }
}

/// Write a successful result to stdout.
pub fn emit<T: Serialize>(format: OutputFormat, value: &T) -> Result<(), std::io::Error> {
    let value = serde_json::to_value(value).map_err(std::io::Error::other)?;
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string(&value).map_err(std::io::Error::other)?;
            println!("{json}");
        }
        OutputFormat::Human => print!("{}", render_human(&value)),
    }
    Ok(())
}

/// Flatten a result object into `key: value` lines. Nested arrays and
/// objects are shown as compact JSON.
pub fn render_human(value: &Value) -> String {
    match value {
        Value::Object(map) if !map.is_empty() => {
            let width = map.keys().map(|k| k.len()).max().unwrap_or(0);
            map.iter()
                .map(|(k, v)| format!("{k:<width$}  {}\n", scalar(v)))
                .collect()
        }
        Value::Array(items) if !items.is_empty() => {
            items.iter().map(|v| format!("- {}\n", scalar(v))).collect()
        }
        other => format!("{}\n", scalar(other)),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

/// Write an error to stdout (JSON mode) or stderr (human mode).
///
/// `exit_code_num` is the raw numeric exit code (1 or 2).
pub fn emit_error(format: OutputFormat, exit_code_num: u8, message: &str) {
    match format {
        OutputFormat::Json => {
            let obj = serde_json::json!({
                "error": message,
                "exit_code": exit_code_num,
            });
            // Errors stay on stdout so callers always read valid JSON there.
            println!("{obj}");
        }
        OutputFormat::Human => {
            eprintln!("error: {message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn human_output_aligns_keys() {
        let out = render_human(&json!({"attempted": 2, "delivered": 1, "note": null}));
        assert_eq!(out, "attempted  2\ndelivered  1\nnote       -\n");
    }

    #[test]
    fn human_output_lists_arrays() {
        assert_eq!(render_human(&json!(["a", 1])), "- a\n- 1\n");
        assert_eq!(render_human(&json!([])), "[]\n");
    }

    #[test]
    fn output_format_display() {
        assert_eq!(OutputFormat::Json.to_string(), "json");
        assert_eq!(OutputFormat::Human.to_string(), "human");
        assert_eq!(OutputFormat::default(), OutputFormat::Human);
    }
}
