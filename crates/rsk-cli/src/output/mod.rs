//! Output formatting utilities for the CLI
//!
//! Payload rendering, the configuration table and colored status messages.

use rsk_core::config::ClientConfig;
use rsk_protocol::Payload;
use tabled::{settings::Style, Table, Tabled};

/// Render payload data for the terminal
///
/// JSON data is pretty-printed, other UTF-8 is printed as is and binary
/// data is summarized by its size.
pub fn format_payload(payload: &Payload) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&payload.data) {
        if value.is_object() || value.is_array() {
            if let Ok(pretty) = serde_json::to_string_pretty(&value) {
                return pretty;
            }
        }
    }
    match std::str::from_utf8(&payload.data) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<{} bytes of binary data>", payload.data.len()),
    }
}

/// Format the effective configuration as a two-column table
pub fn format_config(config: &ClientConfig) -> String {
    #[derive(Tabled)]
    struct SettingRow {
        #[tabled(rename = "SETTING")]
        key: &'static str,
        #[tabled(rename = "VALUE")]
        value: String,
    }

    let connection = &config.connection;
    let fragment_size = if connection.fragmentation_enabled() {
        connection.fragment_size.to_string()
    } else {
        "off".to_string()
    };
    let reconnect = if config.reconnect.enabled {
        format!("every {}", format_millis(config.reconnect.delay.as_millis()))
    } else {
        "off".to_string()
    };

    let rows = vec![
        SettingRow {
            key: "url",
            value: config.url.clone().unwrap_or_else(|| "-".to_string()),
        },
        SettingRow {
            key: "keepalive_interval",
            value: format_millis(connection.keepalive_interval.as_millis()),
        },
        SettingRow {
            key: "max_lifetime",
            value: format_millis(connection.max_lifetime.as_millis()),
        },
        SettingRow {
            key: "data_mime_type",
            value: truncate(&connection.data_mime_type, 48),
        },
        SettingRow {
            key: "metadata_mime_type",
            value: truncate(&connection.metadata_mime_type, 48),
        },
        SettingRow {
            key: "fragment_size",
            value: fragment_size,
        },
        SettingRow {
            key: "reconnect",
            value: reconnect,
        },
    ];

    Table::new(rows).with(Style::rounded()).to_string()
}

fn format_millis(ms: u128) -> String {
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{}ms", ms)
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan to stderr, keeping stdout for payloads
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
