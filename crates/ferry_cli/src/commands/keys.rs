//! Escape and unescape command implementations.

use super::error::CliResult;
use ferry_plan::{escape_binary, unescape_binary};
use serde::Serialize;

/// A key in both renderings.
#[derive(Debug, Serialize)]
pub struct KeyForms {
    /// Binary key text.
    pub text: String,
    /// Key bytes as lower-case hex.
    pub hex: String,
    /// Key length in bytes.
    pub len: usize,
}

impl KeyForms {
    fn new(raw: &[u8]) -> Self {
        Self {
            text: escape_binary(raw),
            hex: raw.iter().map(|b| format!("{b:02x}")).collect(),
            len: raw.len(),
        }
    }
}

/// Runs the escape command.
pub fn escape(key: &str, format: &str) -> CliResult<()> {
    print(&KeyForms::new(key.as_bytes()), format)
}

/// Runs the unescape command.
pub fn unescape(text: &str, format: &str) -> CliResult<()> {
    print(&KeyForms::new(&unescape_binary(text)), format)
}

fn print(forms: &KeyForms, format: &str) -> CliResult<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(forms)?),
        _ => {
            println!("text: {}", forms.text);
            println!("hex:  {}", forms.hex);
            println!("len:  {}", forms.len);
        }
    }
    Ok(())
}
