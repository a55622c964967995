//! `ptypass`: run a command under a pseudo-terminal and answer its password
//! prompts.
//!
//! # Usage
//!
//! ```bash
//! SSH_PASS=secret ptypass -v -- ssh root@192.168.178.1 ls
//! ptypass -f /path/to/pwfile -- scp local user@host:/remote/
//! ```
//!
//! Exits with the command's own exit code, `1` on authentication failure or
//! signal death, `2` on usage errors or a missing password, `3` if the
//! passfile cannot be read, `127` if the command cannot be executed and `130`
//! when interrupted.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::debug;

use ptypass::driver::EngineBuilder;
use ptypass::error::{Error, SecretError};
use ptypass::secret::{SSH_PASS_VAR, resolve_secret};

/// Exit code for usage errors and a missing password.
const USAGE_EXIT: u8 = 2;

/// Exit code when the passfile cannot be read.
const PASSFILE_EXIT: u8 = 3;

/// Exit code when the command cannot be executed.
const EXEC_EXIT: u8 = 127;

#[derive(Parser, Debug)]
#[command(
    name = "ptypass",
    version,
    about = "Run a command under a pseudo-terminal and answer its password prompts"
)]
struct Args {
    /// File with the password (first line)
    #[arg(short = 'f', long)]
    passfile: Option<PathBuf>,

    /// Log prompt handling and trace raw output as hex
    #[arg(short, long)]
    verbose: bool,

    /// Password re-send attempts on re-prompt
    #[arg(short, long, default_value_t = 2)]
    retries: u32,

    /// Command to run (optionally preceded by --)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut command = args.command;
    if command.first().map(String::as_str) == Some("--") {
        command.remove(0);
    }
    if command.is_empty() {
        eprintln!("No command specified. Use: [--] ssh user@host cmd ...");
        return ExitCode::from(USAGE_EXIT);
    }

    let secret = match resolve_secret(args.passfile.as_deref(), SSH_PASS_VAR) {
        Ok(secret) => secret,
        Err(e @ SecretError::Missing { .. }) => {
            eprintln!("{}", e);
            return ExitCode::from(USAGE_EXIT);
        }
        Err(e @ SecretError::Unreadable { .. }) => {
            eprintln!("{}", e);
            return ExitCode::from(PASSFILE_EXIT);
        }
    };

    let engine = match EngineBuilder::new()
        .verbose(args.verbose)
        .max_retries(args.retries)
        .build()
    {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ptypass: {}", e);
            return ExitCode::from(USAGE_EXIT);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("ptypass: cannot start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(engine.execute(&command, &secret));
    // A blocked stdin read must not hold up exit.
    runtime.shutdown_background();

    match result {
        Ok(result) => {
            debug!("{} ({:?})", result.outcome, result.elapsed);
            ExitCode::from(u8::try_from(result.code()).unwrap_or(1))
        }
        Err(Error::Spawn(e)) if e.is_exec_failure() => {
            eprintln!("ptypass: {}", e);
            ExitCode::from(EXEC_EXIT)
        }
        Err(e) => {
            eprintln!("ptypass: {}", e);
            ExitCode::FAILURE
        }
    }
}
