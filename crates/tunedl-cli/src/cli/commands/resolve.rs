//! `tunedl resolve <url>` – show how a URL would be downloaded.

use anyhow::Result;
use tunedl_core::resolver::ResolveMode;

use crate::cli::client::ApiClient;

pub async fn run_resolve(client: &ApiClient, url: &str) -> Result<()> {
    let res = client.resolve(url).await?;
    match res.mode {
        ResolveMode::Direct => println!("direct: {}", res.url.unwrap_or_default()),
        ResolveMode::Playlist => {
            println!("playlist: {}", res.url.unwrap_or_default());
            if let Some(info) = res.playlist {
                println!(
                    "{} ({} entries)",
                    info.title.as_deref().unwrap_or("untitled"),
                    info.total
                );
                for e in info.entries {
                    println!("{:>4}  {}  {}", e.index, e.title, e.url.unwrap_or_default());
                }
            }
        }
        ResolveMode::Choose => {
            println!("channel with {} playlists:", res.choices.len());
            for c in res.choices {
                println!("  {}  {}", c.title, c.url);
            }
        }
    }
    Ok(())
}
