//! Terminal color control.
//!
//! `NO_COLOR` (any value) wins over everything, then `CLICOLOR_FORCE`
//! (non-zero), then `CLICOLOR=0`. Otherwise colors follow whether stdout
//! is a terminal. `--no-color` on the command line behaves like `NO_COLOR`.

use colored::control;
use std::io::IsTerminal;

/// Whether output should be colored, given the relevant environment values.
fn colors_enabled(
    no_color: Option<&str>,
    clicolor: Option<&str>,
    clicolor_force: Option<&str>,
    is_tty: bool,
) -> bool {
    if no_color.is_some() {
        return false;
    }
    if clicolor_force.is_some_and(|v| v != "0") {
        return true;
    }
    if clicolor == Some("0") {
        return false;
    }
    is_tty
}

/// Configure `colored` for the whole process. Call once, early in `main`.
pub fn init_colors(disable: bool) {
    if disable {
        control::set_override(false);
        return;
    }
    let var = |name: &str| std::env::var(name).ok();
    let enabled = colors_enabled(
        var("NO_COLOR").as_deref(),
        var("CLICOLOR").as_deref(),
        var("CLICOLOR_FORCE").as_deref(),
        std::io::stdout().is_terminal(),
    );
    control::set_override(enabled);
}
