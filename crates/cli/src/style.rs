//! Terminal styling helpers.

use console::Style;
use comfy_table::{Cell, Color};

use notemerge_core::models::PrStatus;

pub fn success(msg: &str) -> String {
    format!("{} {}", Style::new().green().apply_to("✓"), msg)
}

pub fn warn(msg: &str) -> String {
    format!("{} {}", Style::new().yellow().apply_to("⚠"), msg)
}

pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// Colored table cell for a pull request status.
pub fn status_cell(status: PrStatus) -> Cell {
    match status {
        PrStatus::Open => Cell::new("● open").fg(Color::Yellow),
        PrStatus::Merged => Cell::new("✓ merged").fg(Color::Green),
        PrStatus::Closed => Cell::new("✗ closed").fg(Color::DarkGrey),
    }
}
