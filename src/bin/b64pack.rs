//! b64pack CLI
//!
//! Pack files/directories into Base64 text and unpack them again.

use anyhow::{bail, Context, Result};
use b64pack::config::DEFAULT_CHUNK_SIZE;
use b64pack::{
    decode_text, encode_text, extract_archive, list_entries, save_archive, CancelToken, Outcome,
    PipelineConfig, Task, TaskEvent, Worklist,
};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Exit status after a second interrupt, as a shell reports SIGINT
const INTERRUPTED_EXIT: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "b64pack")]
#[command(version)]
#[command(about = "Pack files into Base64 text and back")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More log output (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors, no progress
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Bytes processed per chunk
    #[arg(long, global = true, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Directory for intermediate archives (default: system temp dir)
    #[arg(long, global = true)]
    scratch_dir: Option<PathBuf>,

    /// Deflate level, 0-9
    #[arg(long, global = true)]
    level: Option<i32>,

    /// Fail on an undecodable trailing remainder instead of ignoring it
    #[arg(long, global = true)]
    strict: bool,
}

impl PipelineArgs {
    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default()
            .with_chunk_size(self.chunk_size)
            .with_strict_tail(self.strict);
        if let Some(dir) = &self.scratch_dir {
            config = config.with_scratch_dir(dir);
        }
        if let Some(level) = self.level {
            config = config.with_compression_level(level);
        }
        config
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Zip files/directories and encode the archive as Base64
    #[command(visible_alias = "c")]
    Encode {
        /// Files and directories to pack
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output text file (default: stdout, built in memory)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Decode a Base64 text file and save or unpack the archive
    #[command(visible_alias = "x")]
    Decode {
        /// Base64 text file
        input: PathBuf,

        /// Save the decoded ZIP archive here
        #[arg(long, conflicts_with = "extract", required_unless_present = "extract")]
        save: Option<PathBuf>,

        /// Extract the decoded archive into this directory
        #[arg(short = 'C', long)]
        extract: Option<PathBuf>,
    },

    /// List the entries of a Base64-encoded archive
    #[command(visible_alias = "t")]
    List {
        /// Base64 text file
        input: PathBuf,
    },

    /// Encode or decode a short text snippet
    Text {
        #[command(subcommand)]
        action: TextCommand,
    },
}

#[derive(Subcommand, Debug)]
enum TextCommand {
    /// Text to Base64 (default: stdin)
    Encode { text: Option<String> },
    /// Base64 to text (default: stdin)
    Decode { text: Option<String> },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    let config = cli.pipeline.config();

    match cli.command {
        Commands::Encode { inputs, output } => encode(&inputs, output, config, cli.quiet),
        Commands::Decode {
            input,
            save,
            extract,
        } => decode(&input, save, extract, config, cli.quiet),
        Commands::List { input } => list(&input, config, cli.quiet),
        Commands::Text { action } => text(action),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("b64pack={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn encode(inputs: &[PathBuf], output: Option<PathBuf>, config: PipelineConfig, quiet: bool) -> Result<()> {
    let list = Worklist::from_paths(inputs).context("Failed to collect input files")?;
    for skipped in list.skipped() {
        eprintln!("warning: {}: {}", skipped.path.display(), skipped.reason);
    }

    match output {
        Some(path) => {
            let task = Task::encode(list.clone(), &path, config).with_cancel_token(interrupt_token());
            let written = run(task, quiet)?;
            if !quiet {
                eprintln!("Created: {} ({} files)", written.display(), list.len());
            }
        }
        None => {
            config.validate()?;
            let text = b64pack::text::encode_worklist(&list, &config.archive_options())
                .context("Failed to build archive")?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

fn decode(
    input: &Path,
    save: Option<PathBuf>,
    extract: Option<PathBuf>,
    config: PipelineConfig,
    quiet: bool,
) -> Result<()> {
    let task = Task::decode(input, config).with_cancel_token(interrupt_token());
    let archive = run(task, quiet)?;

    if let Some(dest) = save {
        let saved = save_archive(&archive, &dest)
            .with_context(|| format!("Failed to save: {}", dest.display()));
        if saved.is_err() {
            discard(&archive);
        }
        let saved = saved?;
        if !quiet {
            eprintln!("Saved: {}", saved.display());
        }
    } else if let Some(dir) = extract {
        let files = extract_archive(&archive, &dir)
            .with_context(|| format!("Failed to extract to: {}", dir.display()));
        discard(&archive);
        let files = files?;
        if !quiet {
            eprintln!("Extracted {} files to: {}", files.len(), dir.display());
        }
    }
    Ok(())
}

fn list(input: &Path, config: PipelineConfig, quiet: bool) -> Result<()> {
    let task = Task::decode(input, config).with_cancel_token(interrupt_token());
    let archive = run(task, quiet)?;
    let entries = list_entries(&archive);
    discard(&archive);

    for entry in entries? {
        if entry.is_dir {
            continue;
        }
        println!("{:>12}  {}", entry.size, entry.name);
    }
    Ok(())
}

fn text(action: TextCommand) -> Result<()> {
    match action {
        TextCommand::Encode { text } => println!("{}", encode_text(&text_or_stdin(text)?)),
        TextCommand::Decode { text } => println!("{}", decode_text(&text_or_stdin(text)?)),
    }
    Ok(())
}

fn text_or_stdin(text: Option<String>) -> Result<String> {
    match text {
        Some(text) => Ok(text),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer.trim_end_matches(['\r', '\n']).to_string())
        }
    }
}

/// Token canceled on Ctrl-C or SIGTERM. A second interrupt exits at once.
///
/// Install once per process, right before the task that should observe it.
fn interrupt_token() -> CancelToken {
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    let installed = ctrlc::set_handler(move || {
        if handler_token.is_canceled() {
            std::process::exit(INTERRUPTED_EXIT);
        }
        tracing::info!("interrupt received, canceling");
        handler_token.cancel();
    });
    if let Err(e) = installed {
        tracing::warn!(error = %e, "could not install interrupt handler");
    }
    cancel
}

/// Start the task, draw progress on stderr, and wait for the outcome
fn run(task: Task, quiet: bool) -> Result<PathBuf> {
    let handle = task.start()?;
    let mut last_percent = None;

    for event in handle.events() {
        if quiet {
            continue;
        }
        match event {
            TaskEvent::Stage(stage) => {
                if last_percent.take().is_some() {
                    eprintln!();
                }
                eprintln!("{}...", stage);
            }
            TaskEvent::Progress(progress) => {
                let percent = (progress.fraction() * 100.0) as u32;
                if last_percent != Some(percent) {
                    eprint!("\r  {:>3}%  {}/{}", percent, progress.current, progress.total);
                    last_percent = Some(percent);
                }
            }
            TaskEvent::Finished(_) => {
                if last_percent.take().is_some() {
                    eprintln!();
                }
            }
        }
    }

    match handle.wait() {
        Outcome::Succeeded(path) => Ok(path),
        Outcome::Canceled => bail!("Operation canceled"),
        Outcome::Failed(failure) => bail!("{} ({:?})", failure.message, failure.kind),
    }
}

fn discard(archive: &Path) {
    if let Err(e) = fs::remove_file(archive) {
        tracing::warn!(path = %archive.display(), error = %e, "could not remove scratch archive");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_canceled_encode_fails_and_leaves_no_files() {
        let work = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let file = work.path().join("data.bin");
        fs::write(&file, vec![9u8; 64 * 1024]).unwrap();
        let list = Worklist::from_files(&[&file]).unwrap();
        let dest = work.path().join("data.txt");
        let config = PipelineConfig::default()
            .with_chunk_size(1024)
            .with_scratch_dir(scratch.path());

        let cancel = CancelToken::new();
        cancel.cancel();
        let task = Task::encode(list, &dest, config).with_cancel_token(cancel);
        let err = run(task, true).unwrap_err();

        assert!(err.to_string().contains("canceled"));
        assert!(!dest.exists());
        assert_eq!(file_names(work.path()), vec!["data.bin"]);
        assert!(file_names(scratch.path()).is_empty());
    }

    #[test]
    fn test_canceled_decode_leaves_no_scratch_archive() {
        let work = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let input = work.path().join("payload.txt");
        fs::write(&input, encode_text(&"x".repeat(10_000))).unwrap();
        let config = PipelineConfig::default()
            .with_chunk_size(64)
            .with_scratch_dir(scratch.path());

        let cancel = CancelToken::new();
        cancel.cancel();
        let task = Task::decode(&input, config).with_cancel_token(cancel);

        assert!(run(task, true).is_err());
        assert!(file_names(scratch.path()).is_empty());
    }
}
