//! mau CLI - chat companion in the terminal.

use clap::{Parser, Subcommand};
use mau::{cli, config, logging};
use std::process::ExitCode;

/// Get the version string.
///
/// - Release builds (on a git tag): "0.1.0"
/// - Development builds: "0.1.0-dev (abc1234)"
/// - Dirty working directory: "0.1.0-dev (abc1234-dirty)"
fn version() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("MAU_GIT_HASH");
    const IS_RELEASE: &str = env!("MAU_IS_RELEASE");

    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();

    VERSION_STRING.get_or_init(|| {
        if IS_RELEASE == "true" {
            VERSION.to_string()
        } else {
            format!("{VERSION}-dev ({GIT_HASH})")
        }
    })
}

#[derive(Parser)]
#[command(name = "mau")]
#[command(author, version = version(), about = "Chat companion with persistent sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat interactively in the current session (default).
    Chat,

    /// List sessions, most recently updated first.
    List {
        /// Maximum number of sessions to show. Defaults to 20.
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Delete a session.
    Delete {
        /// Session ID or unique prefix.
        session_id: String,
    },

    /// Show or set your display name.
    Name {
        /// New name (at most 20 characters).
        name: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("mau: error: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.logging.level);

    let result = match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => cli::chat::run(&config),
        Commands::List { limit } => cli::list::run(&config, limit),
        Commands::Delete { session_id } => cli::delete::run(&config, &session_id),
        Commands::Name { name } => cli::name::run(&config, name.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mau: error: {e}");
            ExitCode::FAILURE
        }
    }
}
