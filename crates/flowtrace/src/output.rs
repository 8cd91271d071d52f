//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output` (or the config
//! default). Tables use `tabled`, structured formats use serde, plain
//! emits one line per item.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;

/// Resolved presentation settings for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct Presentation {
    pub format: OutputFormat,
    pub color: bool,
    pub quiet: bool,
}

impl Presentation {
    /// Flags win over the config defaults; unknown config values fall back
    /// to the built-in defaults.
    pub fn resolve(global: &GlobalOpts, defaults: &flowtrace_config::Defaults) -> Self {
        use clap::ValueEnum;

        let format = global
            .output
            .or_else(|| OutputFormat::from_str(&defaults.output, true).ok())
            .unwrap_or(OutputFormat::Table);
        let color = global
            .color
            .or_else(|| ColorMode::from_str(&defaults.color, true).ok())
            .unwrap_or(ColorMode::Auto);
        Self {
            format,
            color: should_color(color),
            quiet: global.quiet,
        }
    }
}

pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

/// `SUCCESS` / `FAILURE`, colored when enabled.
pub fn verdict(success: bool, color: bool) -> String {
    match (success, color) {
        (true, true) => "SUCCESS".green().bold().to_string(),
        (false, true) => "FAILURE".red().bold().to_string(),
        (true, false) => "SUCCESS".into(),
        (false, false) => "FAILURE".into(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list: rows for `table`, serde for structured formats, one
/// `id_fn` line per item for `plain`.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Plain => Ok(data.iter().map(id_fn).collect::<Vec<_>>().join("\n")),
        structured => render_structured(structured, data),
    }
}

/// Render a single item; `detail_fn` produces the table view.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: Serialize + ?Sized,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Plain => Ok(id_fn(data)),
        structured => render_structured(structured, data),
    }
}

pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

pub fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_structured<T: Serialize + ?Sized>(
    format: OutputFormat,
    data: &T,
) -> Result<String, CliError> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(data).map_err(|e| ("json", e.to_string())),
        OutputFormat::JsonCompact => serde_json::to_string(data).map_err(|e| ("json", e.to_string())),
        OutputFormat::Yaml => serde_yaml::to_string(data).map_err(|e| ("yaml", e.to_string())),
        OutputFormat::Table | OutputFormat::Plain => {
            return Err(CliError::Internal {
                message: "structured renderer called for a text format".into(),
            });
        }
    };
    rendered.map_err(|(format, reason)| CliError::Render { format, reason })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Item {
        name: &'static str,
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "Name")]
        name: &'static str,
    }

    fn items() -> Vec<Item> {
        vec![Item { name: "s1" }, Item { name: "s2" }]
    }

    #[test]
    fn plain_emits_one_line_per_item() {
        let out =
            render_list(OutputFormat::Plain, &items(), |i| Row { name: i.name }, |i| i.name.into())
                .unwrap();
        assert_eq!(out, "s1\ns2");
    }

    #[test]
    fn table_has_header_and_rows() {
        let out =
            render_list(OutputFormat::Table, &items(), |i| Row { name: i.name }, |i| i.name.into())
                .unwrap();
        assert!(out.contains("Name"));
        assert!(out.contains("s2"));
    }

    #[test]
    fn compact_json_is_single_line() {
        let out = render_single(OutputFormat::JsonCompact, &items(), |_| String::new(), |_| {
            String::new()
        })
        .unwrap();
        assert_eq!(out, r#"[{"name":"s1"},{"name":"s2"}]"#);
    }

    #[test]
    fn uncolored_verdict_is_plain_text() {
        assert_eq!(verdict(true, false), "SUCCESS");
        assert_eq!(verdict(false, false), "FAILURE");
    }
}
