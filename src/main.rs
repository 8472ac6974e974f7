//! Satchel - request-scoped sessions with flash messages
//!
//! CLI entry point with global panic handler.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use satchel::config::{satchel_home, Config};
use satchel::error::exit_codes;
use satchel::storage::{CookieBackend, FileBackend};

// =============================================================================
// CLI Definition
// =============================================================================

/// Satchel - inspect and maintain a session store
#[derive(Parser)]
#[command(name = "satchel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(long, short, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a project config with a generated cookie secret
    Init {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
        /// Overwrite an existing project config (rotates the secret)
        #[arg(long, short)]
        force: bool,
    },

    /// List sessions stored by the file backend
    Sessions {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
        /// Maximum number of sessions to show
        #[arg(long, short, default_value = "20")]
        limit: usize,
    },

    /// Show one stored session with its flash markers
    Show {
        /// Session ID to inspect
        session_id: String,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Verify and decode a cookie token with the configured secret
    Decode {
        /// The token as sent by the client
        token: String,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Remove expired sessions from the file backend
    Clean {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
        /// Also remove sessions idle longer than duration (e.g., "7d", "24h")
        #[arg(long)]
        before: Option<String>,
        /// Also remove orphaned temp files
        #[arg(long)]
        orphans: bool,
        /// Show what would be cleaned without removing
        #[arg(long)]
        dry_run: bool,
    },
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    setup_panic_handler();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("satchel error: {}", e);
            ExitCode::from(exit_codes::ERROR as u8)
        }
    }
}

/// Set up the global panic handler.
///
/// On panic, logs to ~/.satchel/crash.log and exits with code 3.
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("satchel panic: {}", info);

        if let Some(home) = satchel_home() {
            let crash_log = home.join("crash.log");
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log)
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }

        std::process::exit(exit_codes::CRASH);
    }));
}

/// Install the stderr log subscriber.
fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("satchel=warn"),
        1 => EnvFilter::new("satchel=info"),
        _ => EnvFilter::new("satchel=debug"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

/// Run the CLI and return the exit code.
fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Init { json, quiet, force } => run_init(json, quiet, force, &cwd),
        Commands::Sessions { json, quiet, limit } => run_sessions(json, quiet, limit, &cwd),
        Commands::Show {
            session_id,
            json,
            quiet,
        } => run_show(&session_id, json, quiet, &cwd),
        Commands::Decode { token, json, quiet } => run_decode(&token, json, quiet, &cwd),
        Commands::Clean {
            json,
            quiet,
            before,
            orphans,
            dry_run,
        } => run_clean(json, quiet, before, orphans, dry_run, &cwd),
    }
}

// =============================================================================
// Command Implementations
// =============================================================================

fn success_to_exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::from(exit_codes::SUCCESS as u8)
    } else {
        ExitCode::from(exit_codes::ERROR as u8)
    }
}

fn print_formatted(formatted: &str) {
    if !formatted.is_empty() {
        println!("{}", formatted.trim_end());
    }
}

/// Open the file backend at the configured sessions directory.
fn file_backend(cwd: &Path) -> Result<FileBackend, Box<dyn std::error::Error>> {
    let config = Config::load_from_cwd(cwd);
    if config.session.backend != "file" {
        debug!(
            backend = %config.session.backend,
            "configured backend is not 'file'; inspecting the sessions directory anyway"
        );
    }

    let dir = config
        .sessions_dir()
        .ok_or("could not determine sessions directory")?;
    Ok(FileBackend::with_dir(dir)?.with_max_size(config.session.max_size_bytes))
}

fn run_init(
    json: bool,
    quiet: bool,
    force: bool,
    cwd: &Path,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use satchel::cli::init::{InitCommand, InitOptions};

    let cmd = InitCommand::new(cwd);
    let options = InitOptions { json, quiet, force };

    let output = cmd.run(&options);
    print_formatted(&cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}

fn run_sessions(
    json: bool,
    quiet: bool,
    limit: usize,
    cwd: &Path,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use satchel::cli::sessions::{SessionsCommand, SessionsOptions};

    let cmd = SessionsCommand::new(file_backend(cwd)?);
    let options = SessionsOptions { json, quiet, limit };

    let output = cmd.run(&options);

    if !quiet {
        if json {
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{}", output.format_text());
        }
    }

    Ok(success_to_exit_code(output.success))
}

fn run_show(
    session_id: &str,
    json: bool,
    quiet: bool,
    cwd: &Path,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use satchel::cli::show::{ShowCommand, ShowOptions};

    let cmd = ShowCommand::new(file_backend(cwd)?);
    let options = ShowOptions { json, quiet };

    let output = cmd.run(session_id);
    print_formatted(&cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}

fn run_decode(
    token: &str,
    json: bool,
    quiet: bool,
    cwd: &Path,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use satchel::cli::decode::{DecodeCommand, DecodeOptions};

    let config = Config::load_from_cwd(cwd);
    let secret = config
        .cookie
        .secret
        .as_deref()
        .ok_or("no cookie secret configured (run `satchel init` or set SATCHEL_SECRET)")?;

    let mut backend =
        CookieBackend::new(secret)?.with_previous_secrets(&config.cookie.previous_secrets)?;
    if let Some(limit) = config.session.max_size_bytes {
        backend = backend.with_max_size(limit);
    }

    let cmd = DecodeCommand::new(backend).with_key(config.session.key.clone());
    let options = DecodeOptions { json, quiet };

    let output = cmd.run(token);
    print_formatted(&cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}

fn run_clean(
    json: bool,
    quiet: bool,
    before: Option<String>,
    orphans: bool,
    dry_run: bool,
    cwd: &Path,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use satchel::cli::clean::{CleanCommand, CleanOptions};

    let cmd = CleanCommand::new(file_backend(cwd)?);
    let options = CleanOptions {
        json,
        quiet,
        before,
        orphans,
        dry_run,
    };

    let output = cmd.run(&options);
    print_formatted(&cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}

// =============================================================================
// Tests
// =============================================================================
