use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use monitor_core::{DEFAULT_DATA_SOURCE, TIME_FORMAT};

use crate::logging::LogDestination;

#[derive(Debug, Parser)]
#[command(
    name = "monitor",
    version,
    about = "Batch parse task monitor for the opinion analysis backend"
)]
pub(crate) struct Cli {
    /// Backend base URL.
    #[arg(
        long,
        value_name = "URL",
        default_value = "http://127.0.0.1:8000",
        global = true
    )]
    pub base_url: String,

    /// Directory for exported documents and the run record.
    #[arg(long, value_name = "DIR", default_value = "output", global = true)]
    pub output_dir: PathBuf,

    /// Where diagnostic logs go. The run log always prints to stdout.
    #[arg(long, value_enum, default_value_t = LogDestination::File, global = true)]
    pub log: LogDestination,

    /// Log at debug level.
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Start a batch parse run and monitor it until it finishes.
    Run(RunArgs),
    /// Download the deduplicated results of a completed run.
    Export(ExportArgs),
}

#[derive(Debug, Parser)]
pub(crate) struct RunArgs {
    /// Data source key submitted to the backend.
    #[arg(long, value_name = "NAME", default_value = DEFAULT_DATA_SOURCE)]
    pub data_source: String,

    /// Window start (YYYY-MM-DDTHH:MM). Defaults to the database's earliest record.
    #[arg(long, value_name = "TIME", value_parser = parse_wire_time)]
    pub start: Option<NaiveDateTime>,

    /// Window end (YYYY-MM-DDTHH:MM). Defaults to the database's latest record.
    #[arg(long, value_name = "TIME", value_parser = parse_wire_time)]
    pub end: Option<NaiveDateTime>,

    /// Record field the window filters on.
    #[arg(long, value_name = "FIELD", default_value = "publish_time")]
    pub time_field: String,

    /// Skip sentiment analysis.
    #[arg(long)]
    pub no_sentiment: bool,

    /// Skip tag extraction.
    #[arg(long)]
    pub no_tags: bool,

    /// Skip company recognition.
    #[arg(long)]
    pub no_companies: bool,

    /// Fail the run when the stream stays silent this long.
    #[arg(long, value_name = "SECONDS")]
    pub idle_timeout_secs: Option<u64>,

    /// Download the deduplicated results once the run completes.
    #[arg(long)]
    pub export: bool,
}

#[derive(Debug, Parser)]
pub(crate) struct ExportArgs {
    /// Session to export. Defaults to the last recorded completed run.
    #[arg(long, value_name = "ID")]
    pub session: Option<String>,
}

fn parse_wire_time(raw: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(raw, TIME_FORMAT)
        .map_err(|err| format!("expected YYYY-MM-DDTHH:MM: {err}"))
}
