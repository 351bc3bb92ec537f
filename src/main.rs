use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use chrono::{Duration, Utc};
use clap::Parser;
use report_panel::{MarkdownRenderer, RendererOptions, ReportData, TimeRange};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Render a report template to HTML.
#[derive(Parser, Debug)]
#[command(name = "report-render", version, about)]
struct Cli {
    /// Template file; stdin when omitted.
    template: Option<PathBuf>,

    /// Data snapshot (series, variables, userData) as JSON.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Start of the time range, RFC 3339. Defaults to six hours before `--to`.
    #[arg(long)]
    from: Option<String>,

    /// End of the time range, RFC 3339. Defaults to now.
    #[arg(long)]
    to: Option<String>,

    /// Renderer options as JSON.
    #[arg(long)]
    options: Option<PathBuf>,

    /// Render as if data had not arrived yet.
    #[arg(long)]
    pending: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid time {value:?}: {source}")]
    Time {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

fn read_file(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn parse_time(value: &str) -> Result<chrono::DateTime<chrono::FixedOffset>, CliError> {
    chrono::DateTime::parse_from_rfc3339(value).map_err(|source| CliError::Time {
        value: value.to_string(),
        source,
    })
}

fn time_range(cli: &Cli) -> Result<TimeRange, CliError> {
    let to = match &cli.to {
        Some(value) => parse_time(value)?,
        None => Utc::now().fixed_offset(),
    };
    let from = match &cli.from {
        Some(value) => parse_time(value)?,
        None => to - Duration::hours(6),
    };
    Ok(TimeRange::new(from, to))
}

fn run(cli: &Cli) -> Result<String, CliError> {
    let content = match &cli.template {
        Some(path) => read_file(path)?,
        None => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .map_err(|source| CliError::Io {
                    path: "<stdin>".to_string(),
                    source,
                })?;
            input
        }
    };

    let options = match &cli.options {
        Some(path) => {
            RendererOptions::from_json(&read_file(path)?).map_err(|source| CliError::Json {
                path: path.display().to_string(),
                source,
            })?
        }
        None => RendererOptions::default(),
    };
    let renderer = MarkdownRenderer::new(options);

    if cli.pending {
        return Ok(renderer.render_pending(&content));
    }

    let data = match &cli.data {
        Some(path) => ReportData::from_json(&read_file(path)?).map_err(|source| CliError::Json {
            path: path.display().to_string(),
            source,
        })?,
        None => ReportData::default(),
    };
    Ok(renderer.render(&content, &data, &time_range(cli)?))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(html) => print!("{}", html),
        Err(err) => {
            eprintln!("report-render: {}", err);
            process::exit(1);
        }
    }
}
