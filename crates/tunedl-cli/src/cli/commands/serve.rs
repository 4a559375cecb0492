//! `tunedl serve` – run the job engine behind the HTTP API until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tunedl_core::config::TunedlConfig;
use tunedl_core::resolver::{YtDlpMetadata, YtDlpResolver};
use tunedl_core::JobManager;

use crate::server::{self, AppState};

pub async fn run_serve(
    mut cfg: TunedlConfig,
    listen: Option<String>,
    concurrency: Option<usize>,
) -> Result<()> {
    if let Some(addr) = listen {
        cfg.listen_addr = addr;
    }
    if let Some(n) = concurrency {
        cfg.max_concurrent_items = n;
    }

    let manager = Arc::new(JobManager::from_config(&cfg)?);
    let metadata = YtDlpMetadata::new(cfg.ytdlp_bin.clone(), cfg.proxy.clone());
    let state = AppState {
        manager,
        resolver: Arc::new(YtDlpResolver::new(Arc::new(metadata))),
    };

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("bind {}", cfg.listen_addr))?;
    println!("tunedl listening on http://{}", cfg.listen_addr);

    server::serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutting down");
    })
    .await
}
