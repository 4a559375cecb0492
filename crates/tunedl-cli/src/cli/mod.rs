//! CLI for the tunedl audio downloader.

mod client;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use tunedl_core::config;

use client::ApiClient;
use commands::{
    run_add, run_cancel, run_completions, run_manpage, run_pause, run_remove, run_resolve,
    run_resume, run_serve, run_status,
};

/// Top-level CLI for tunedl.
#[derive(Debug, Parser)]
#[command(name = "tunedl")]
#[command(about = "tunedl: audio track downloader with a job queue", long_about = None)]
pub struct Cli {
    /// Address of a running `tunedl serve` (defaults to `listen_addr` from the config).
    #[arg(long, global = true, value_name = "ADDR")]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the job engine and its HTTP API.
    Serve {
        /// Bind address, e.g. 127.0.0.1:5000.
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
        /// Items downloading at once across all jobs.
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,
    },

    /// Classify a URL as a single track, a playlist, or a channel.
    Resolve {
        url: String,
    },

    /// Submit a download job.
    Add {
        /// Source URL (track or playlist page).
        url: String,
        /// Job title; names the output folder when items are given.
        #[arg(long)]
        title: Option<String>,
        /// Download only these entries (repeatable).
        #[arg(long = "item", value_name = "URL")]
        items: Vec<String>,
    },

    /// List jobs, or show one job in detail.
    Status {
        id: Option<String>,
    },

    /// Pause a job, or one of its items with --item.
    Pause {
        id: String,
        #[arg(long, value_name = "INDEX")]
        item: Option<u32>,
    },

    /// Resume a job, or one of its items with --item.
    Resume {
        id: String,
        #[arg(long, value_name = "INDEX")]
        item: Option<u32>,
    },

    /// Cancel a job; finished tracks are kept.
    Cancel {
        id: String,
    },

    /// Delete a job and its files.
    Remove {
        id: String,
    },

    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// Print a roff man page.
    Manpage,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Completions { shell } => return run_completions(shell, Cli::command()),
            CliCommand::Manpage => return run_manpage(Cli::command()),
            _ => {}
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let client = || ApiClient::new(cli.server.as_deref().unwrap_or(&cfg.listen_addr));

        match cli.command {
            CliCommand::Serve {
                listen,
                concurrency,
            } => run_serve(cfg.clone(), listen, concurrency).await?,
            CliCommand::Resolve { url } => run_resolve(&client(), &url).await?,
            CliCommand::Add { url, title, items } => run_add(&client(), url, title, items).await?,
            CliCommand::Status { id } => run_status(&client(), id.as_deref()).await?,
            CliCommand::Pause { id, item } => run_pause(&client(), &id, item).await?,
            CliCommand::Resume { id, item } => run_resume(&client(), &id, item).await?,
            CliCommand::Cancel { id } => run_cancel(&client(), &id).await?,
            CliCommand::Remove { id } => run_remove(&client(), &id).await?,
            CliCommand::Completions { .. } | CliCommand::Manpage => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
