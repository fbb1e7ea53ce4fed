//! changeapp command line interface
//!
//! Usage:
//!   changeapp plan            - Show the resolved provisioning plan
//!   changeapp apply           - Create user, collections, and indexes
//!   changeapp verify          - Compare the server against the plan

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use changeapp_kernel::settings::{Environment, LoadOptions, Settings};
use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(name = "changeapp")]
#[command(about = "Provision and verify the changeapp transaction store")]
#[command(version)]
pub struct Cli {
    /// Directory holding base.toml and the environment overlays
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Configuration overlay to load (development, test, staging, production)
    #[arg(long, global = true)]
    env: Option<String>,

    /// MongoDB connection string; `mem://` uses the in-process backend
    #[arg(long, global = true)]
    mongo_uri: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the provisioning plan without connecting
    Plan {
        /// Restrict to the databases of one environment
        #[arg(long)]
        only: Option<Environment>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Create the application user, collections, and indexes
    Apply {
        /// Restrict to the databases of one environment
        #[arg(long)]
        only: Option<Environment>,
        /// Report what would change without changing it
        #[arg(long)]
        dry_run: bool,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Check user, collections, and indexes against the plan
    Verify {
        /// Restrict to the databases of one environment
        #[arg(long)]
        only: Option<Environment>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    fn load_settings(&self) -> anyhow::Result<Settings> {
        let mut settings = Settings::load_with(LoadOptions {
            config_dir: self.config_dir.clone(),
            environment: self.env.clone(),
        })
        .with_context(|| "failed to load changeapp settings")?;

        if let Some(uri) = &self.mongo_uri {
            settings.mongo.uri = uri.clone();
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match commands::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
