//! HTTP client for the client subcommands (talks to `tunedl serve`).

use anyhow::{bail, Context, Result};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tunedl_core::job::JobSummary;
use tunedl_core::resolver::Resolution;

use crate::server::{CreateJobRequest, CreateJobResponse, JobView, OkResponse, ResolveRequest};

pub struct ApiClient {
    base: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// `addr` is `host:port` or a full `http://` base URL.
    pub fn new(addr: &str) -> Self {
        let addr = addr.trim_end_matches('/');
        let base = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        };
        Self {
            base,
            http: reqwest::Client::new(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let res = self
            .http
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .with_context(|| format!("is `tunedl serve` running at {}?", self.base()))?;
        Ok(check(res).await?.json().await?)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let res = self
            .http
            .post(format!("{}{path}", self.base))
            .json(body)
            .send()
            .await
            .with_context(|| format!("is `tunedl serve` running at {}?", self.base()))?;
        Ok(check(res).await?.json().await?)
    }

    pub async fn resolve(&self, url: &str) -> Result<Resolution> {
        self.post("/resolve", &ResolveRequest { url: url.to_string() }).await
    }

    pub async fn create_job(&self, req: &CreateJobRequest) -> Result<String> {
        let res: CreateJobResponse = self.post("/jobs", req).await?;
        Ok(res.job_id)
    }

    pub async fn jobs(&self) -> Result<Vec<JobSummary>> {
        self.get("/jobs").await
    }

    pub async fn job(&self, id: &str) -> Result<JobView> {
        self.get(&format!("/jobs/{id}")).await
    }

    /// `action` is one of cancel, pause, resume, delete.
    pub async fn job_action(&self, id: &str, action: &str) -> Result<()> {
        let _: OkResponse = self.post(&format!("/jobs/{id}/{action}"), &()).await?;
        Ok(())
    }

    pub async fn item_action(&self, id: &str, index: u32, action: &str) -> Result<()> {
        let _: OkResponse = self
            .post(&format!("/jobs/{id}/items/{index}/{action}"), &())
            .await?;
        Ok(())
    }
}

async fn check(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body: serde_json::Value = res.json().await.unwrap_or_default();
    let msg = body["error"].as_str().unwrap_or("request failed");
    bail!("{status}: {msg}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_from_addr() {
        assert_eq!(ApiClient::new("127.0.0.1:5000").base(), "http://127.0.0.1:5000");
        assert_eq!(ApiClient::new("http://host:1/").base(), "http://host:1");
    }
}
