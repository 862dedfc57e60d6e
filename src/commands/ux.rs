//! Console output: a stderr spinner plus styled or JSON results on stdout.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

/// Console helpers shared by every command.
pub struct Ux {
    spinner: ProgressBar,
    json: bool,
    quiet: bool,
}

impl Ux {
    /// Interactive console. In JSON mode only the final result is printed.
    pub fn new(json: bool) -> Self {
        Self {
            spinner: ProgressBar::hidden(),
            json,
            quiet: false,
        }
    }

    /// Console that prints nothing, for embedding and tests.
    pub fn quiet() -> Self {
        Self {
            spinner: ProgressBar::hidden(),
            json: false,
            quiet: true,
        }
    }

    /// Shows a spinner with `message` on stderr until `stop_spinner`.
    pub fn start_spinner(&mut self, message: &str) {
        self.spinner.finish_and_clear();
        if self.quiet || self.json {
            return;
        }

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✔"]),
            );
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        self.spinner = spinner;
    }

    pub fn stop_spinner(&mut self) {
        self.spinner.finish_and_clear();
        self.spinner = ProgressBar::hidden();
    }

    /// Prints an informational line to stdout (suppressed in JSON mode).
    pub fn log(&self, line: &str) {
        if self.quiet || self.json {
            return;
        }
        self.spinner.suspend(|| println!("{}", line));
    }

    /// Prints the command result.
    pub fn styled_object(&self, value: &Value) {
        if self.quiet {
            return;
        }
        if self.json {
            match serde_json::to_string_pretty(value) {
                Ok(text) => println!("{}", text),
                Err(_) => println!("{}", value),
            }
        } else {
            self.spinner.suspend(|| println!("{}", render_styled_object(value)));
        }
    }
}

impl Drop for Ux {
    fn drop(&mut self) {
        self.spinner.finish_and_clear();
    }
}

/// Renders a JSON object as aligned `key  value` lines.
///
/// Lists print one element per indented line; empty lists print `(none)`.
/// Non-object values render as compact JSON.
pub fn render_styled_object(value: &Value) -> String {
    let Value::Object(map) = value else {
        return value.to_string();
    };

    let width = map.keys().map(|k| k.len()).max().unwrap_or(0);
    let mut out = String::new();

    for (key, value) in map {
        if !out.is_empty() {
            out.push('\n');
        }
        match value {
            Value::Array(items) if items.is_empty() => {
                out.push_str(&format!("{:<width$}  (none)", key, width = width));
            }
            Value::Array(items) => {
                out.push_str(&format!("{} ({})", key, items.len()));
                for item in items {
                    out.push_str("\n  ");
                    out.push_str(&render_scalar(item));
                }
            }
            other => {
                out.push_str(&format!("{:<width$}  {}", key, render_scalar(other), width = width));
            }
        }
    }

    out
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
