//! Terminal output
//!
//! Human output goes through status lines and aligned fields. JSON output
//! prints whole documents on stdout and keeps status lines machine
//! readable; informational lines and fields are dropped.

use serde_json::json;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        self == OutputFormat::Json
    }

    pub fn success(self, message: &str) {
        match self {
            Self::Human => println!("\u{2713} {message}"),
            Self::Json => println!("{}", json!({"success": true, "message": message})),
        }
    }

    pub fn error(self, message: &str) {
        match self {
            Self::Human => eprintln!("\u{2717} Error: {message}"),
            Self::Json => eprintln!("{}", json!({"success": false, "error": message})),
        }
    }

    pub fn warn(self, message: &str) {
        match self {
            Self::Human => eprintln!("\u{26a0} Warning: {message}"),
            Self::Json => eprintln!("{}", json!({"level": "warning", "message": message})),
        }
    }

    pub fn info(self, message: &str) {
        if self == Self::Human {
            println!("  {message}");
        }
    }

    /// A labelled value, aligned in human output
    pub fn field(self, label: &str, value: &str) {
        if self == Self::Human {
            println!("  {:<18} {}", format!("{label}:"), value);
        }
    }

    pub fn print_json(self, value: &serde_json::Value) {
        if self.is_json() {
            println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
        }
    }
}
