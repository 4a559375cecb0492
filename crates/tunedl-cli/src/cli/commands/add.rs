//! `tunedl add <url>` – submit a download job.

use anyhow::Result;

use crate::cli::client::ApiClient;
use crate::server::CreateJobRequest;

pub async fn run_add(
    client: &ApiClient,
    url: String,
    title: Option<String>,
    items: Vec<String>,
) -> Result<()> {
    let req = CreateJobRequest {
        url: url.clone(),
        video_urls: (!items.is_empty()).then_some(items),
        title,
        ..CreateJobRequest::default()
    };
    let id = client.create_job(&req).await?;
    println!("Added job {id} for URL: {url}");
    Ok(())
}
