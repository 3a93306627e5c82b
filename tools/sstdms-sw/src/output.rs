use serde::Serialize;
use std::fmt;

/// Output format selection for all subcommands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Single JSON object on stdout.
    Json,
    /// Human-readable summary on stdout.
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

/// Render a successful result.
pub fn render<T: Serialize>(format: OutputFormat, value: &T) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string(value),
        OutputFormat::Human => serde_json::to_string_pretty(value),
    }
}

/// Write a successful result to stdout.
pub fn emit<T: Serialize>(format: OutputFormat, value: &T) -> Result<(), serde_json::Error> {
    println!("{}", render(format, value)?);
    Ok(())
}

/// Write an error to stdout (JSON mode) or stderr (human mode).
pub fn emit_error(format: OutputFormat, exit_code: u8, message: &str) {
    match format {
        OutputFormat::Json => {
            let obj = serde_json::json!({
                "error": message,
                "exit_code": exit_code,
            });
            // Callers always get valid JSON on stdout.
            println!("{obj}");
        }
        OutputFormat::Human => {
            eprintln!("error: {message}");
        }
    }
}
