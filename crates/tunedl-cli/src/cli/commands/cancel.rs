//! `tunedl cancel <id>` – stop a job; tracks already downloaded stay.

use anyhow::Result;

use crate::cli::client::ApiClient;

pub async fn run_cancel(client: &ApiClient, id: &str) -> Result<()> {
    client.job_action(id, "cancel").await?;
    println!("Canceling job {id}");
    Ok(())
}
