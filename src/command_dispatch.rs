//! Purpose: Execute parsed CLI commands against a `WriterPool`.
//! Exports: `dispatch_command`.
//! Role: Glue between clap arguments and the library API.
//! Invariants: Every command closes its pool before reporting success, so all
//! accepted bytes are on disk when the process exits.
use std::collections::BTreeSet;
use std::io::{self, BufRead, Read};
use std::sync::Arc;

use clap::CommandFactory;
use serde_json::json;
use tracing::info;

use writerpool::api::{Error, ErrorKind, PoolConfig, ResourceKey, WriterPool};

use super::bucket::current_bucket;
use super::status_json::status_json;
use super::{Cli, Command, RunOutcome, emit_json};

pub(super) fn dispatch_command(command: Command, config: PoolConfig) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "writerpool", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Status => {
            let pool = WriterPool::new(config)?;
            let status = pool.status()?;
            let resources = pool.resources()?;
            pool.close()?;
            let body = status_json(&status, &resources)?;
            emit_json(json!({ "status": body }));
            Ok(RunOutcome::ok())
        }
        Command::Write {
            directory,
            name,
            data,
            newline,
        } => {
            let mut payload = match data {
                Some(text) => text.into_bytes(),
                None => read_stdin()?,
            };
            if newline {
                payload.push(b'\n');
            }
            let path = ResourceKey::new(directory.as_str(), name.as_str())?
                .file_path(config.storage_root());

            let pool = WriterPool::new(config)?;
            let written = pool.write(&directory, &name, &payload);
            let closed = pool.close();
            written?;
            closed?;

            emit_json(json!({
                "written": {
                    "directory": directory,
                    "name": name,
                    "path": path.display().to_string(),
                    "bytes": payload.len(),
                }
            }));
            Ok(RunOutcome::ok())
        }
        Command::Ingest { directory, name } => {
            let pool = Arc::new(WriterPool::new(config)?);
            install_shutdown(&pool)?;

            let ingested = ingest_lines(&pool, directory.as_deref(), name.as_deref());
            let closed = pool.close();
            let summary = ingested?;
            closed?;

            emit_json(json!({
                "ingested": {
                    "lines": summary.lines,
                    "bytes": summary.bytes,
                    "keys": summary.keys.into_iter().collect::<Vec<_>>(),
                }
            }));
            Ok(RunOutcome::ok())
        }
    }
}

#[derive(Debug, Default)]
struct IngestSummary {
    lines: u64,
    bytes: u64,
    keys: BTreeSet<String>,
}

fn ingest_lines(
    pool: &WriterPool,
    directory: Option<&str>,
    name: Option<&str>,
) -> Result<IngestSummary, Error> {
    let mut summary = IngestSummary::default();
    for line in io::stdin().lock().split(b'\n') {
        let mut line = line.map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to read stdin")
                .with_source(err)
        })?;
        line.push(b'\n');

        let bucket = current_bucket();
        let target_dir = directory.unwrap_or(bucket.directory.as_str());
        let target_name = name.unwrap_or(bucket.name.as_str());
        pool.write(target_dir, target_name, &line)?;

        summary.lines += 1;
        summary.bytes += line.len() as u64;
        summary.keys.insert(format!("{target_dir}/{target_name}"));
    }
    Ok(summary)
}

fn read_stdin() -> Result<Vec<u8>, Error> {
    let mut payload = Vec::new();
    io::stdin().lock().read_to_end(&mut payload).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to read stdin")
            .with_source(err)
    })?;
    Ok(payload)
}

#[cfg(unix)]
fn install_shutdown(pool: &Arc<WriterPool>) -> Result<(), Error> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to install signal handlers")
            .with_source(err)
    })?;
    let pool = Arc::clone(pool);
    std::thread::Builder::new()
        .name("writerpool-signal".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(signal, "signal received; draining buffers");
                let exit_code = match pool.close() {
                    Ok(()) => 128 + signal,
                    Err(err) => {
                        tracing::error!(error = %err, "close during shutdown failed");
                        writerpool::api::to_exit_code(err.kind())
                    }
                };
                std::process::exit(exit_code);
            }
        })
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to start signal thread")
                .with_source(err)
        })?;
    Ok(())
}

#[cfg(not(unix))]
fn install_shutdown(_pool: &Arc<WriterPool>) -> Result<(), Error> {
    Ok(())
}
