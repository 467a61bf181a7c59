use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use sigmux_language::{Definition, OptionMap, Value};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_definitions(definitions: &[Definition], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(definitions).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "RESOURCE", "PIPE", "SIGNALS", "OPTIONS"]);
            for definition in definitions {
                let (kind, signals, options) = match definition {
                    Definition::Stream(def) => ("stream", &def.signals, &def.options),
                    Definition::Recording(def) => ("recording", &def.signals, &def.options),
                };
                table.add_row(vec![
                    kind.to_string(),
                    definition.resource().to_string(),
                    definition.pipe().to_string(),
                    signals
                        .iter()
                        .map(|s| s.uri.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                    render_options(options),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for definition in definitions {
                let (kind, count) = match definition {
                    Definition::Stream(def) => ("stream", def.signals.len()),
                    Definition::Recording(def) => ("recording", def.signals.len()),
                };
                println!(
                    "{kind} <{}> -> {} ({count} signals)",
                    definition.resource(),
                    definition.pipe()
                );
            }
        }
    }
}

fn render_options(options: &OptionMap) -> String {
    options
        .iter()
        .map(|(key, value)| match value {
            Value::Flag(true) => key.to_string(),
            Value::Flag(false) => format!("{key}=false"),
            Value::Uri(uri) => format!("{key}=<{uri}>"),
            Value::Str(text) => format!("{key}={text:?}"),
            Value::Number(number) => format!("{key}={number}"),
            Value::Token(token) => format!("{key}={token}"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
