//! `tunedl resume <id> [--item N]`

use anyhow::Result;

use crate::cli::client::ApiClient;

pub async fn run_resume(client: &ApiClient, id: &str, item: Option<u32>) -> Result<()> {
    match item {
        Some(index) => {
            client.item_action(id, index, "resume").await?;
            println!("Resumed item {index} of job {id}");
        }
        None => {
            client.job_action(id, "resume").await?;
            println!("Resumed job {id}");
        }
    }
    Ok(())
}
