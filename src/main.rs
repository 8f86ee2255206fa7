use clap::{Args, Parser, Subcommand};
use eccvault::codec::{Codec, CommandCodec, ReedSolomonCodec};
use eccvault::orchestrator::{EccOptions, Operation, Orchestrator};
use eccvault::params::{CodecParams, DEFAULT_GALOIS_EXP, DEFAULT_MESSAGE_SIZE, DEFAULT_RESULT_SIZE};
use eccvault::report::{BatchReport, FileOutcome};
use eccvault::select::SelectOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit status when `--fail-on-corruption` is set and a check found a problem.
const EXIT_CORRUPTION: u8 = 2;

#[derive(Parser)]
#[command(name = "ecc", version, about = "Reed-Solomon parity files for encrypted backups")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[command(flatten)]
    log: LogArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the ECC store of every protected file that has none
    Create(CommonArgs),
    /// Verify every block of every protected file against its ECC store
    Check(CommonArgs),
    /// Only check that file and ECC store sizes are consistent
    CheckSize(CommonArgs),
    /// Write a repaired copy of every protected file under ecc-regenerated/
    Fix {
        #[command(flatten)]
        common: CommonArgs,
        /// Compare each repaired copy with its input afterwards
        #[arg(long)]
        compare: bool,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Files or directories to process (directories are walked recursively)
    #[arg(short, long, required = true, num_args = 1..)]
    input: Vec<PathBuf>,
    /// Skip files larger than this many megabytes
    #[arg(long, env = "ECC_MAX_SIZE_MB")]
    max_size_mb: Option<u64>,
    /// Codeword length n
    #[arg(long, env = "ECC_RESULT_SIZE", default_value_t = DEFAULT_RESULT_SIZE)]
    result_size: usize,
    /// Message length k
    #[arg(long, env = "ECC_MESSAGE_SIZE", default_value_t = DEFAULT_MESSAGE_SIZE)]
    message_size: usize,
    /// Galois field exponent
    #[arg(long, env = "ECC_EXP", default_value_t = DEFAULT_GALOIS_EXP)]
    exp: u32,
    /// Directory holding the ecc-<n>-<k>-<exp>/ and ecc-regenerated/ trees
    #[arg(long, env = "ECC_STORE_ROOT", default_value = ".")]
    store_root: PathBuf,
    /// Extension of protected files; "*" accepts any file
    #[arg(long, env = "ECC_EXTENSION", default_value = "gpg")]
    extension: String,
    /// Give up on a single file after this many seconds
    #[arg(long, env = "ECC_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,
    /// External codec executable, called as `<cmd> [args] encode|verify|decode`
    #[arg(long, env = "ECC_CODEC_COMMAND")]
    codec_command: Option<PathBuf>,
    /// Extra argument for --codec-command (repeatable)
    #[arg(long = "codec-arg", allow_hyphen_values = true)]
    codec_args: Vec<String>,
    /// Exit with status 2 if a check finds corruption or a size mismatch
    #[arg(long, env = "ECC_FAIL_ON_CORRUPTION")]
    fail_on_corruption: bool,
    /// Write the batch report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args)]
struct LogArgs {
    #[arg(
        long,
        global = true,
        env = "ECC_LOG_LEVEL",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    log_level: String,
    /// Log as JSON lines
    #[arg(long, global = true, env = "ECC_LOG_JSON")]
    log_json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log);

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let (op, args) = match command {
        Commands::Create(args)        => (Operation::Create, args),
        Commands::Check(args)         => (Operation::Check, args),
        Commands::CheckSize(args)     => (Operation::CheckSize, args),
        Commands::Fix { common, compare } => (Operation::Fix { compare }, common),
    };

    let orch = Orchestrator::new(build_codec(&args)?, options(&args));
    let batch = orch.run(op, &args.input)?;

    print_batch(&batch);
    if let Some(path) = &args.report {
        std::fs::write(path, batch.to_bytes()?)?;
        info!(report = %path.display(), "batch report written");
    }

    let checking = matches!(op, Operation::Check | Operation::CheckSize);
    if args.fail_on_corruption && checking && batch.found_corruption() {
        return Ok(ExitCode::from(EXIT_CORRUPTION));
    }
    Ok(ExitCode::SUCCESS)
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn build_codec(args: &CommonArgs) -> Result<Box<dyn Codec>, Box<dyn std::error::Error>> {
    let params = CodecParams::new(args.result_size, args.message_size, args.exp)?;
    Ok(match &args.codec_command {
        Some(cmd) => Box::new(CommandCodec::new(cmd, params).args(&args.codec_args)),
        None      => Box::new(ReedSolomonCodec::new(params)?),
    })
}

fn options(args: &CommonArgs) -> EccOptions {
    let extension = match args.extension.trim_start_matches('.') {
        "*" => None,
        ext => Some(ext.to_owned()),
    };
    let mut select = SelectOptions { extension, max_size: None };
    if let Some(mb) = args.max_size_mb {
        select = select.max_size_mb(mb);
    }
    EccOptions {
        store_root:   args.store_root.clone(),
        select,
        file_timeout: args.timeout_secs.map(Duration::from_secs),
        ..EccOptions::default()
    }
}

fn print_batch(batch: &BatchReport) {
    for file in &batch.files {
        let (status, detail) = match &file.outcome {
            FileOutcome::Succeeded { result }   => ("ok", result.summary()),
            FileOutcome::Skipped { reason, .. } => ("skipped", reason.clone()),
            FileOutcome::Failed { reason, .. }  => ("FAILED", reason.clone()),
        };
        println!("  {:<8} {}  {}", status, file.path.display(), detail);
    }
    println!("{}", batch.summary());
}

fn init_logging(args: &LogArgs) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
