//! Maintenance commands for the SABBAR lead database.
//!
//! Every command is checked against the access policies for the configured
//! role before the store is touched.

mod commands;
mod config;
mod error;

use clap::Parser;
use database::{Database, PolicySet};
use tracing_subscriber::EnvFilter;

use crate::commands::Command;
use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "sabbar-admin")]
#[command(about = "Maintenance commands for the SABBAR lead database")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let policies = PolicySet::placeholder();
    args.command.authorize(&policies, config.role)?;

    let db = Database::connect_with_pool_size(&config.database_url, config.pool_size).await?;
    let output = commands::execute(&args.command, &policies, config.role, &db).await;
    db.close().await;

    if let Some(text) = output? {
        println!("{text}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_subcommands() {
        let args = Args::try_parse_from(["sabbar-admin", "recount", "--agent", "a-1"]).unwrap();
        assert_eq!(
            args.command,
            Command::Recount {
                agent: Some("a-1".to_string())
            }
        );

        let args = Args::try_parse_from([
            "sabbar-admin",
            "export-conversation",
            "--session",
            "wa-42",
            "--out",
            "wa-42.json",
        ])
        .unwrap();
        assert_eq!(
            args.command,
            Command::ExportConversation {
                session: "wa-42".to_string(),
                out: Some(PathBuf::from("wa-42.json")),
            }
        );

        let args = Args::try_parse_from(["sabbar-admin", "audit"]).unwrap();
        assert_eq!(args.command, Command::Audit);
    }

    #[test]
    fn test_missing_arguments_rejected() {
        assert!(Args::try_parse_from(["sabbar-admin"]).is_err());
        assert!(Args::try_parse_from(["sabbar-admin", "import-conversation"]).is_err());
        assert!(Args::try_parse_from(["sabbar-admin", "export-conversation"]).is_err());
    }
}
