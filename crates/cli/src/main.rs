//! KBQA CLI
//!
//! Main entry point for the knowledge-base command-line tool.
//! Manages Q&A pairs and conversations, and searches the knowledge base
//! by keyword or by meaning.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use commands::{ConversationCommand, QaCommand};
use kbqa_core::logging::{self, LogOptions};
use kbqa_core::{AppConfig, AppResult};
use kbqa_knowledge::KnowledgeBase;
use std::path::PathBuf;
use std::process::ExitCode;

/// KBQA CLI - question/answer knowledge base with full-text and semantic search
#[derive(Parser, Debug)]
#[command(name = "kbqa")]
#[command(about = "Question/answer knowledge base with full-text and semantic search", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "KBQA_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to the SQLite database (":memory:" for a throwaway store)
    #[arg(long, global = true, env = "KBQA_DB_PATH")]
    db: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Print results and errors as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage and search Q&A pairs
    Qa(QaCommand),

    /// Manage conversations and their messages
    Conversation(ConversationCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&e, json);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    // Load base configuration from file and environment
    let config = AppConfig::load()?;

    // Apply CLI overrides
    let mut config =
        config.with_overrides(cli.workspace, cli.db, cli.log_level, cli.verbose, cli.no_color);
    config.log_json |= cli.log_json;

    logging::init_logging(&LogOptions {
        level: config.log_level.as_deref(),
        no_color: config.no_color,
        json: config.log_json,
    })?;

    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Database: {:?}", config.database.path);

    // Ensure .kbqa directory exists for the default on-disk stores
    config.ensure_kbqa_dir()?;

    let command_name = match &cli.command {
        Commands::Qa(_) => "qa",
        Commands::Conversation(_) => "conversation",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let kb = KnowledgeBase::open(&config)?;

    let result = match cli.command {
        Commands::Qa(cmd) => cmd.execute(&kb, cli.json).await,
        Commands::Conversation(cmd) => cmd.execute(&kb, cli.json).await,
    };

    match &result {
        Ok(_) => tracing::debug!("Command completed successfully"),
        Err(e) => tracing::error!(code = e.code(), "Command failed: {}", e),
    }

    result
}
