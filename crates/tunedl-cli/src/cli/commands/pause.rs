//! `tunedl pause <id> [--item N]`

use anyhow::Result;

use crate::cli::client::ApiClient;

pub async fn run_pause(client: &ApiClient, id: &str, item: Option<u32>) -> Result<()> {
    match item {
        Some(index) => {
            client.item_action(id, index, "pause").await?;
            println!("Paused item {index} of job {id}");
        }
        None => {
            client.job_action(id, "pause").await?;
            println!("Paused job {id}");
        }
    }
    Ok(())
}
