//! `tunedl remove <id>` – delete a job together with its files.

use anyhow::Result;

use crate::cli::client::ApiClient;

pub async fn run_remove(client: &ApiClient, id: &str) -> Result<()> {
    client.job_action(id, "delete").await?;
    println!("Removed job {id}");
    Ok(())
}
