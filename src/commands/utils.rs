//! Shared helpers for command output

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::IsTerminal;
use std::time::Duration;

pub(super) fn is_tty() -> bool {
    std::io::stdout().is_terminal()
}

/// Spinner on a TTY, hidden otherwise.
pub(super) fn spinner(message: impl Into<String>) -> ProgressBar {
    if !is_tty() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub(super) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Lay `items` out in columns that fit `width`, filling down then across.
pub(super) fn format_columns(items: &[String], width: usize) -> String {
    if items.is_empty() {
        return String::new();
    }
    let longest = items.iter().map(|s| s.chars().count()).max().unwrap_or(0);
    let col_width = longest + 2;
    let cols = (width / col_width).max(1);
    let rows = items.len().div_ceil(cols);

    let mut out = String::new();
    for row in 0..rows {
        let mut line = String::new();
        for col in 0..cols {
            let Some(item) = items.get(col * rows + row) else {
                break;
            };
            line.push_str(item);
            if col + 1 < cols && (col + 1) * rows + row < items.len() {
                let pad = col_width - item.chars().count();
                line.push_str(&" ".repeat(pad));
            }
        }
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Terminal width, 80 when it cannot be determined.
pub(super) fn terminal_width() -> usize {
    term_size::dimensions().map(|(w, _)| w).unwrap_or(80)
}
