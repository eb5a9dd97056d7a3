use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::io::{self, IsTerminal, Read, Write};
use tokio_util::sync::CancellationToken;

use aiassist::config::{Config, LoadedConfig};
use aiassist::confirm::{ask_yes_no, TerminalPrompter};
use aiassist::error_handling::{
    display_info, display_status, display_success, display_warning, enhance_error, session_exit,
};
use aiassist::execution::SystemShell;
use aiassist::i18n::I18n;
use aiassist::logging::{get_logger, init_logger, LogCategory, LogContext};
use aiassist::providers::ProviderManager;
use aiassist::session::Session;
use aiassist::sysinfo::SystemInfo;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "aiassist")]
#[command(version)]
#[command(about = "AI shell assistant for server operations", long_about = "Ask questions about a server in plain language. The assistant proposes diagnostic commands, runs them after you confirm, and analyses their output.")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Question to ask first (in pipe mode: the question about the piped data)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    question: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Config,
    /// Print the configuration file location
    ConfigPath,
    /// Show the detected system information
    Sysinfo {
        /// Collect the facts again instead of using the cache
        #[arg(long)]
        refresh: bool,
    },
    /// Show configured models in fallback order
    Status,
    /// Show current log file location and status
    LogStatus,
    /// Clear the log file
    ClearLogs,
    /// Print the version
    Version,
}

#[tokio::main]
async fn main() {
    if let Err(e) = init_logger() {
        eprintln!("Warning: Failed to initialize logger: {}", e);
    }
    aiassist::logging::with_logger(|l| l.log_startup(VERSION));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let cli = Cli::parse();
    match run(cli, cancel).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if let Some(exit) = session_exit(&e) {
                aiassist::log_info!(
                    LogCategory::Session,
                    format!("Session ended by user ({:?})", exit),
                    LogContext::new("main").with_operation("exit")
                );
                println!();
                println!("{}", goodbye().cyan());
                std::process::exit(0);
            }
            enhance_error(&e).display();
            std::process::exit(1);
        }
    }
}

/// Goodbye line in the configured language, English when the config cannot be read
fn goodbye() -> String {
    let language = Config::load()
        .map(|loaded| loaded.config.language())
        .unwrap_or_default();
    I18n::new(language).t("interactive.goodbye")
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<i32> {
    if let Some(command) = cli.command {
        return run_subcommand(command, cancel).await;
    }

    let LoadedConfig { config, path, created } = Config::load()?;
    let i18n = I18n::new(config.language());

    if created {
        display_warning(&i18n.t("config.not_found"));
        display_info(&i18n.tf("config.created", &[&path.display()]));
        display_info(&i18n.tf("config.hint_edit", &[&path.display()]));
        return Ok(1);
    }
    if !config.has_enabled_models() {
        eprintln!("{}", i18n.t("error.no_models").red());
        display_info(&i18n.tf("error.hint_no_models", &[&path.display()]));
        return Ok(1);
    }

    let manager = ProviderManager::from_config(&config)?;
    let facts = tokio::task::spawn_blocking(SystemInfo::detect).await??;
    let question = cli.question.join(" ");

    let mut session = Session::new(
        &config,
        manager,
        Box::new(TerminalPrompter::new(cancel.clone())),
        Box::new(SystemShell),
        Some(facts.format_as_context()),
        cancel,
    )?;

    if io::stdin().is_terminal() {
        aiassist::log_info!(LogCategory::Session, "Interactive session started");
        session.run(Some(question)).await?;
        return Ok(0);
    }

    aiassist::log_info!(LogCategory::Session, "Pipe analysis started");
    let data = tokio::task::spawn_blocking(|| {
        let mut data = String::new();
        io::stdin().read_to_string(&mut data).map(|_| data)
    })
    .await??;
    session.analyze_pipe(Some(&question), &data).await?;
    Ok(0)
}

async fn run_subcommand(command: Commands, cancel: CancellationToken) -> Result<i32> {
    match command {
        Commands::Config => {
            let loaded = Config::load()?;
            loaded.config.display(&loaded.path);
        }
        Commands::ConfigPath => {
            println!("{}", Config::config_path()?.display());
        }
        Commands::Sysinfo { refresh } => {
            let info = if refresh {
                tokio::task::spawn_blocking(SystemInfo::refresh).await??
            } else {
                tokio::task::spawn_blocking(SystemInfo::detect).await??
            };
            info.display();
            if refresh {
                display_success("System information refreshed");
            }
        }
        Commands::Status => {
            let loaded = Config::load()?;
            let manager = ProviderManager::from_config(&loaded.config)?;
            let i18n = I18n::new(loaded.config.language());
            if manager.is_empty() {
                eprintln!("{}", i18n.t("error.no_models").red());
                display_info(&i18n.tf("error.hint_no_models", &[&loaded.path.display()]));
                return Ok(1);
            }
            manager.display_status(&i18n, loaded.config.default_model.as_deref());
        }
        Commands::LogStatus => {
            let logger = get_logger()?;
            let guard = logger
                .lock()
                .map_err(|_| anyhow::anyhow!("logger lock poisoned"))?;

            println!("{}", "Logging status:".bold().cyan());
            println!("Log file: {}", guard.log_path().display().to_string().green());
            display_status("Debug mode", if guard.is_debug_mode() { "enabled" } else { "disabled" }, !guard.is_debug_mode());
            match std::fs::metadata(guard.log_path()) {
                Ok(metadata) => println!("Log file size: {} KB", metadata.len() / 1024),
                Err(_) => println!("Log file: not created yet"),
            }

            println!();
            display_info("Commands, questions and model replies are only logged in debug mode");
            if guard.is_debug_mode() {
                display_warning("Debug mode is active - detailed information may be logged");
            } else {
                display_info("Set AIASSIST_DEBUG=1 for detailed troubleshooting logs");
            }
        }
        Commands::ClearLogs => {
            let prompter = TerminalPrompter::new(cancel);
            if !ask_yes_no(&prompter, "Are you sure you want to clear all logs? (y/n): ").await? {
                display_info("Log clearing cancelled");
                return Ok(0);
            }

            let logger = get_logger()?;
            let guard = logger
                .lock()
                .map_err(|_| anyhow::anyhow!("logger lock poisoned"))?;
            guard.clear_logs()?;
            display_success("Log file cleared");
        }
        Commands::Version => {
            println!("aiassist {}", VERSION);
        }
    }

    io::stdout().flush()?;
    Ok(0)
}
