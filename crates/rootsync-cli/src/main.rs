//! rootsync CLI - Command-line interface for the rootsync change feed
//!
//! Provides commands for:
//! - Registering and unregistering synchronization roots
//! - Polling the change feed with a cursor
//! - Looking up file system items and browsing folders
//! - Authoring documents in the local SQLite repository
//! - Inspecting the configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rootsync_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;
mod session;

use commands::{
    changes::ChangesCommand,
    config::ConfigCommand,
    doc::DocCommand,
    items::{ChildrenCommand, ItemCommand},
    roots::{RegisterCommand, RootsCommand, UnregisterCommand},
};
use output::OutputFormat;
use session::Session;

#[derive(Debug, Parser)]
#[command(
    name = "rootsync",
    version,
    about = "Change feed for synchronization roots"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use alternate SQLite database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Register a folder or collection as a synchronization root
    Register(RegisterCommand),
    /// Unregister a synchronization root
    Unregister(UnregisterCommand),
    /// List the synchronization roots of a principal
    Roots(RootsCommand),
    /// Poll the change feed
    Changes(ChangesCommand),
    /// Show a file system item
    Item(ItemCommand),
    /// List the children of a folder item
    Children(ChildrenCommand),
    /// Author documents in the local repository
    #[command(subcommand)]
    Doc(DocCommand),
    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    // Logging settings come from the file even when it is otherwise invalid
    let logging = Config::load_or_default(&config_path).logging;
    let level = match cli.verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    if let Commands::Config(cmd) = &cli.command {
        return cmd.execute(&config_path, format).await;
    }

    let session = Session::open(&config_path, cli.db.as_deref()).await?;
    match &cli.command {
        Commands::Register(cmd) => cmd.execute(&session, format).await,
        Commands::Unregister(cmd) => cmd.execute(&session, format).await,
        Commands::Roots(cmd) => cmd.execute(&session, format).await,
        Commands::Changes(cmd) => cmd.execute(&session, format).await,
        Commands::Item(cmd) => cmd.execute(&session, format).await,
        Commands::Children(cmd) => cmd.execute(&session, format).await,
        Commands::Doc(cmd) => cmd.execute(&session, format).await,
        Commands::Config(cmd) => cmd.execute(&config_path, format).await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use rootsync_core::domain::LogPosition;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_changes() {
        let cli = Cli::try_parse_from([
            "rootsync", "--json", "changes", "-p", "alice", "--since", "42", "-r", "default",
            "-r", "archive",
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::Changes(cmd) = cli.command else {
            panic!("expected changes command");
        };
        assert_eq!(cmd.principal.as_str(), "alice");
        assert_eq!(cmd.since, LogPosition::new(42));
        assert_eq!(cmd.repositories.len(), 2);
        assert!(cmd.limit.is_none());
    }

    #[test]
    fn test_parse_register_defaults_repository() {
        let cli = Cli::try_parse_from(["rootsync", "register", "doc-1", "--principal", "bob"])
            .unwrap();
        let Commands::Register(cmd) = cli.command else {
            panic!("expected register command");
        };
        assert_eq!(cmd.target.doc_id.as_str(), "doc-1");
        assert_eq!(cmd.target.repository.as_str(), "default");
    }

    #[test]
    fn test_invalid_principal_is_rejected() {
        assert!(Cli::try_parse_from(["rootsync", "roots", "--principal", ""]).is_err());
    }

    #[test]
    fn test_parse_doc_copy_and_edit() {
        let cli = Cli::try_parse_from(["rootsync", "doc", "copy", "a", "b", "-r", "archive"]).unwrap();
        let Commands::Doc(DocCommand::Copy { doc_id, new_parent, repo }) = cli.command else {
            panic!("expected doc copy command");
        };
        assert_eq!(doc_id.as_str(), "a");
        assert_eq!(new_parent.as_str(), "b");
        assert_eq!(repo.repository.as_str(), "archive");

        let cli = Cli::try_parse_from(["rootsync", "doc", "edit", "a", "-p", "alice"]).unwrap();
        let Commands::Doc(DocCommand::Edit { principal, repo, .. }) = cli.command else {
            panic!("expected doc edit command");
        };
        assert_eq!(principal.as_str(), "alice");
        assert_eq!(repo.repository.as_str(), "default");
    }

    #[test]
    fn test_children_defaults_to_top_level() {
        let cli = Cli::try_parse_from(["rootsync", "children", "-p", "alice"]).unwrap();
        let Commands::Children(cmd) = cli.command else {
            panic!("expected children command");
        };
        assert!(cmd.item_id.is_none());
    }
}
