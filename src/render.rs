//! Client for the external document renderer.
//!
//! The renderer turns an ordered page sequence plus a fixed sheet geometry into a
//! document file. We POST one JSON job to `{RENDERER_URL}/render` and expect the
//! finished file bytes back. Calls log job ids, page counts, latencies and sizes,
//! never page contents.

use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::PageGeometry;
use crate::error::CoreError;
use crate::paginate::Page;
use crate::util::trunc_for_log;

/// Everything the renderer needs for one document.
#[derive(Debug, Serialize)]
pub struct RenderJob {
  pub job_id: String,
  pub filename: String,
  pub geometry: PageGeometry,
  pub pages: Vec<Page>,
}

impl RenderJob {
  pub fn new(filename: String, geometry: PageGeometry, pages: Vec<Page>) -> Self {
    Self { job_id: Uuid::new_v4().to_string(), filename, geometry, pages }
  }
}

#[derive(Clone)]
pub struct RenderClient {
  pub client: reqwest::Client,
  pub base_url: String,
}

impl RenderClient {
  /// Construct the client if RENDERER_URL is set; otherwise return None.
  pub fn from_env(timeout: Duration) -> Option<Self> {
    let base_url = std::env::var("RENDERER_URL").ok()?;
    Self::new(base_url, timeout)
  }

  pub fn new(base_url: String, timeout: Duration) -> Option<Self> {
    let base_url = base_url.trim_end_matches('/').to_string();
    if base_url.is_empty() {
      return None;
    }
    let client = reqwest::Client::builder().timeout(timeout).build().ok()?;
    Some(Self { client, base_url })
  }

  #[instrument(level = "info", skip(self, job), fields(job_id = %job.job_id, pages = job.pages.len()))]
  pub async fn render(&self, job: &RenderJob) -> Result<Vec<u8>, CoreError> {
    let url = format!("{}/render", self.base_url);
    let start = Instant::now();

    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, concat!("gradebridge/", env!("CARGO_PKG_VERSION")))
      .header(CONTENT_TYPE, "application/json")
      .header(ACCEPT, "application/pdf")
      .json(job)
      .send()
      .await
      .map_err(|e| {
        error!(target: "render", error = %e, "Renderer unreachable");
        CoreError::RenderUnavailable(e.to_string())
      })?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      error!(target: "render", %status, body = %trunc_for_log(&body, 200), "Renderer refused job");
      return Err(CoreError::RenderUnavailable(format!("renderer returned HTTP {}", status)));
    }

    let bytes = res.bytes().await.map_err(|e| CoreError::RenderUnavailable(e.to_string()))?;
    info!(target: "render", elapsed = ?start.elapsed(), bytes = bytes.len(), "Document rendered");
    Ok(bytes.to_vec())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_url_means_no_renderer() {
    assert!(RenderClient::new("  ".trim().into(), Duration::from_secs(1)).is_none());
    let c = RenderClient::new("http://127.0.0.1:9/".into(), Duration::from_secs(1)).unwrap();
    assert_eq!(c.base_url, "http://127.0.0.1:9");
  }

  #[tokio::test]
  async fn unreachable_renderer_is_render_unavailable() {
    // Port 9 (discard) is closed on test machines; the connection is refused.
    let c = RenderClient::new("http://127.0.0.1:9".into(), Duration::from_secs(2)).unwrap();
    let job = RenderJob::new("x.pdf".into(), PageGeometry::default(), vec![]);
    let err = c.render(&job).await.unwrap_err();
    assert_eq!(err.code(), "render_unavailable");
  }
}
