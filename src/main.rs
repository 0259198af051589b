//! Purpose: `writerpool` CLI entry point.
//! Role: Binary crate root; parses args, builds the pool config, runs one command.
//! Invariants: Command results are emitted as JSON on stdout.
//! Invariants: Errors are text on a TTY stderr and JSON otherwise.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod bucket;
mod command_dispatch;
mod status_json;

use writerpool::api::{
    DEFAULT_BUFFER_CAPACITY, DEFAULT_FLUSH_THRESHOLD, DEFAULT_STORAGE_ROOT, Error, ErrorKind,
    PoolConfig, to_exit_code,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Internal)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome { exit_code });
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `writerpool --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing();

    let color_mode = cli.color;
    let config = cli.pool.into_config();
    command_dispatch::dispatch_command(cli.command, config)
        .map_err(add_storage_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "writerpool",
    version,
    about = "Buffered append-only writers keyed by (directory, name)",
    long_about = r#"Append payloads to <dir>/<directory>/<name>.txt through a pool of buffered writers.

Buffers flush when they pass the flush threshold, when the one-shot flush timer fires, and on close."#
)]
struct Cli {
    #[command(flatten)]
    pool: PoolArgs,
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        global = true,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Clone, Debug)]
struct PoolArgs {
    #[arg(
        long,
        global = true,
        default_value = DEFAULT_STORAGE_ROOT,
        help = "Storage root holding one directory per bucket",
        value_hint = ValueHint::DirPath
    )]
    dir: PathBuf,
    #[arg(long, global = true, default_value_t = DEFAULT_BUFFER_CAPACITY, help = "Per-file buffer capacity in bytes")]
    buffer_capacity: usize,
    #[arg(long, global = true, default_value_t = DEFAULT_FLUSH_THRESHOLD, help = "Flush before appending once this many bytes are buffered")]
    flush_threshold: usize,
    #[arg(long, global = true, default_value_t = 30_000, help = "One-shot flush timer delay in milliseconds")]
    flush_delay_ms: u64,
    #[arg(long, global = true, default_value_t = 3_600_000, help = "One-shot eviction timer delay in milliseconds")]
    evict_delay_ms: u64,
}

impl PoolArgs {
    fn into_config(self) -> PoolConfig {
        PoolConfig::new(self.dir)
            .with_buffer_capacity(self.buffer_capacity)
            .with_flush_threshold(self.flush_threshold)
            .with_flush_delay(Duration::from_millis(self.flush_delay_ms))
            .with_evict_delay(Duration::from_millis(self.evict_delay_ms))
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Append one payload and close",
        after_help = r#"EXAMPLES
  $ writerpool write 20230101 1 --data abc
  $ echo hello | writerpool write 20230101 1"#
    )]
    Write {
        #[arg(help = "Bucket directory under the storage root")]
        directory: String,
        #[arg(help = "File name inside the bucket (stored as <name>.txt)")]
        name: String,
        #[arg(long, help = "Payload text (reads stdin when omitted)")]
        data: Option<String>,
        #[arg(long, help = "Append a trailing newline to the payload")]
        newline: bool,
    },
    #[command(
        about = "Append stdin lines, bucketed by UTC time unless pinned",
        after_help = r#"EXAMPLES
  $ tail -f app.log | writerpool ingest
  $ cat events.txt | writerpool ingest --directory 20230101 --name 1

Without --directory/--name each line lands in <YYYYMMDD>/<HH>.txt for the current UTC hour.
SIGINT/SIGTERM drain every buffer before exiting."#
    )]
    Ingest {
        #[arg(long, help = "Pin the bucket directory instead of the UTC date")]
        directory: Option<String>,
        #[arg(long, help = "Pin the file name instead of the UTC hour")]
        name: Option<String>,
    },
    #[command(about = "Print the effective pool configuration as JSON")]
    Status,
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn add_storage_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::DirectoryCreateFailed | ErrorKind::FileOpenFailed => err.with_hint(
            "Check permissions on the storage root or use --dir to a writable location.",
        ),
        ErrorKind::FlushFailed | ErrorKind::WriteFailed | ErrorKind::HandleCloseFailed => {
            err.with_hint("I/O error. Check the filesystem and disk space.")
        }
        _ => err,
    }
}

pub(crate) fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }
    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::DirectoryCreateFailed => "failed to create directory",
        ErrorKind::FileOpenFailed => "failed to open file",
        ErrorKind::FlushFailed => "failed to flush buffer",
        ErrorKind::WriteFailed => "failed to write",
        ErrorKind::HandleCloseFailed => "failed to close file",
        ErrorKind::PoolClosed => "pool is closed",
    }
    .to_string()
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(key) = err.key() {
        inner.insert("key".to_string(), json!(key));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];
    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(key) = err.key() {
        lines.push(format!(
            "{} {key}",
            colorize_label("key:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    for cause in error_causes(err) {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, error_json, error_text};
    use clap::Parser;
    use std::io;
    use std::time::Duration;
    use writerpool::api::{Error, ErrorKind};

    #[test]
    fn error_text_respects_color_flag() {
        let err = Error::new(ErrorKind::Usage).with_message("bad input");
        let colored = error_text(&err, true);
        let plain = error_text(&err, false);
        assert!(colored.contains("\u{1b}[31merror:\u{1b}[0m"));
        assert!(plain.contains("error:"));
        assert!(!plain.contains("\u{1b}["));
    }

    #[test]
    fn error_json_lists_causes() {
        let err = Error::new(ErrorKind::FileOpenFailed)
            .with_key("20230101/1")
            .with_source(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "FileOpenFailed");
        assert_eq!(value["error"]["message"], "failed to open file");
        assert_eq!(value["error"]["key"], "20230101/1");
        assert_eq!(value["error"]["causes"][0], "denied");
    }

    #[test]
    fn pool_flags_build_config() {
        let cli = Cli::try_parse_from([
            "writerpool",
            "--dir",
            "/tmp/logs",
            "--flush-threshold",
            "100",
            "--flush-delay-ms",
            "250",
            "write",
            "20230101",
            "1",
            "--data",
            "abc",
        ])
        .expect("parse");
        assert!(matches!(cli.command, Command::Write { .. }));
        let config = cli.pool.into_config();
        assert_eq!(config.storage_root(), std::path::Path::new("/tmp/logs"));
        assert_eq!(config.flush_threshold, 100);
        assert_eq!(config.buffer_capacity, 4096);
        assert_eq!(config.flush_delay, Duration::from_millis(250));
        assert_eq!(config.evict_delay, Duration::from_secs(3600));
    }
}
