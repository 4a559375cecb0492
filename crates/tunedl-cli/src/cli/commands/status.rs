//! `tunedl status [id]` – list jobs, or show one job's items.

use anyhow::Result;

use crate::cli::client::ApiClient;

pub async fn run_status(client: &ApiClient, id: Option<&str>) -> Result<()> {
    let Some(id) = id else {
        let jobs = client.jobs().await?;
        if jobs.is_empty() {
            println!("No jobs.");
            return Ok(());
        }
        println!("{:<32} {:<10} {:>6} {:>7}  {}", "ID", "STATUS", "PROG", "TRACKS", "TITLE/URL");
        for j in jobs {
            let status = if j.paused && !j.status.is_terminal() {
                format!("{} (p)", j.status)
            } else {
                j.status.to_string()
            };
            println!(
                "{:<32} {:<10} {:>5.1}% {:>3}/{:<3}  {}",
                j.id,
                status,
                j.progress,
                j.downloaded_count,
                j.total_items,
                j.title.as_deref().unwrap_or(&j.source_url)
            );
        }
        return Ok(());
    };

    let view = client.job(id).await?;
    let job = &view.job;
    println!("{} [{}] {:.1}%{}", job.id, job.status, job.progress, if job.paused { " paused" } else { "" });
    println!("{}", job.message);
    for it in &job.items {
        print!("{:>4}  {:<11} {:>5.1}%  {}", it.index, it.status.as_str(), it.progress, it.title);
        if let Some(err) = it.error_msg.as_deref().and_then(|e| e.lines().last()) {
            print!("  ({err})");
        }
        println!();
    }
    if let Some(url) = &view.download_url {
        println!("archive: {url}");
    }
    Ok(())
}
