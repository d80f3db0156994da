//! Remote job queue access
//!
//! Jobs live in a PostgREST-style HTTP API. [`JobSource`] is the seam the
//! worker depends on so tests can substitute an in-memory queue; the
//! production implementation is [`SupabaseJobSource`].

use crate::config::Config;
use crate::job::{JobState, LabelFormat, PrintJob};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const JOBS_TABLE: &str = "impresiones";
const CATALOG_TABLE: &str = "colores_personalizados";
const CATALOG_ROW: &str = "colores_global";

pub type SourceResult<T> = Result<T, SourceError>;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Source rejected request ({status}): {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("Source unreachable after {attempts} attempts")]
    Unreachable { attempts: u32 },
}

/// Color catalog: which templates the source expects to exist
///
/// Keyed by material, then by format, then by color name. The per-color
/// payload (hex values, display names) is opaque to the worker; only the
/// names matter for the template audit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ColorCatalog {
    #[serde(flatten)]
    pub materials: HashMap<String, MaterialColors>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MaterialColors {
    #[serde(default, rename = "chica")]
    pub small: HashMap<String, serde_json::Value>,
    #[serde(default, rename = "grande")]
    pub large: HashMap<String, serde_json::Value>,
}

impl ColorCatalog {
    /// Every (material, format, color) combination in the catalog
    pub fn entries(&self) -> impl Iterator<Item = (&str, LabelFormat, &str)> + '_ {
        self.materials.iter().flat_map(|(material, colors)| {
            let small = colors
                .small
                .keys()
                .map(move |color| (material.as_str(), LabelFormat::Small, color.as_str()));
            let large = colors
                .large
                .keys()
                .map(move |color| (material.as_str(), LabelFormat::Large, color.as_str()));
            small.chain(large)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.materials
            .values()
            .all(|m| m.small.is_empty() && m.large.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(default)]
    colores_data: ColorCatalog,
}

/// Remote queue operations the worker needs
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Up to `limit` pending jobs, oldest first. Failures degrade to an
    /// empty batch after logging; the caller cannot tell "no work" from
    /// "source down" and does not need to.
    async fn fetch_pending(&mut self, limit: u32) -> Vec<PrintJob>;

    /// Write a job's terminal state back. Single attempt; retry policy
    /// belongs to the caller.
    async fn update_state(&mut self, job_id: i64, state: JobState) -> SourceResult<()>;

    /// Cheap reachability check
    async fn probe(&mut self) -> bool;

    /// Rebuild the connection, bounded attempts with a fixed wait
    async fn reconnect(&mut self) -> SourceResult<()>;

    /// Catalog of colors the source expects templates for
    async fn fetch_color_catalog(&mut self) -> SourceResult<ColorCatalog>;
}

/// PostgREST client for the production queue
#[derive(Debug)]
pub struct SupabaseJobSource {
    http: Client,
    base_url: String,
    api_key: String,
    connect_retries: u32,
    connect_retry_delay: Duration,
    established: bool,
}

impl SupabaseJobSource {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        connect_retries: u32,
        connect_retry_delay: Duration,
    ) -> SourceResult<Self> {
        Ok(Self {
            http: Self::build_client()?,
            base_url: base_url.into(),
            api_key: api_key.into(),
            connect_retries,
            connect_retry_delay,
            established: false,
        })
    }

    pub fn from_config(config: &Config) -> SourceResult<Self> {
        Self::new(
            config.supabase_url.clone(),
            config.supabase_key.clone(),
            config.connect_retries,
            config.connect_retry_delay,
        )
    }

    fn build_client() -> SourceResult<Client> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(client)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", self.api_key.as_str())
            .bearer_auth(&self.api_key)
    }

    async fn check(resp: Response) -> SourceResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(SourceError::Rejected { status, body })
    }

    async fn probe_once(&self) -> bool {
        let resp = self
            .authed(self.http.get(self.rest_url(JOBS_TABLE)))
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await;
        matches!(resp, Ok(r) if r.status().is_success())
    }

    /// Probe, and when the source dropped, run a full reconnect cycle
    /// before giving up on this batch. Connectivity transitions log once.
    async fn ensure_connected(&mut self) -> bool {
        if self.probe_once().await {
            if !self.established {
                info!("Job source reachable");
                self.established = true;
            }
            return true;
        }
        if self.established {
            warn!("Job source connection lost");
            self.established = false;
        }
        self.reconnect().await.is_ok()
    }

    async fn try_fetch(&self, limit: u32) -> SourceResult<Vec<PrintJob>> {
        let limit = limit.to_string();
        let resp = self
            .authed(self.http.get(self.rest_url(JOBS_TABLE)))
            .query(&[
                ("select", "*"),
                ("estado", "eq.pendiente"),
                ("order", "timestamp.asc"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;
        let jobs = Self::check(resp).await?.json::<Vec<PrintJob>>().await?;
        Ok(jobs)
    }
}

#[async_trait]
impl JobSource for SupabaseJobSource {
    async fn fetch_pending(&mut self, limit: u32) -> Vec<PrintJob> {
        if !self.ensure_connected().await {
            return Vec::new();
        }
        match self.try_fetch(limit).await {
            Ok(jobs) => {
                debug!(count = jobs.len(), "Pending jobs fetched");
                jobs
            }
            Err(e) => {
                warn!(error = %e, "Fetching pending jobs failed");
                self.established = false;
                Vec::new()
            }
        }
    }

    async fn update_state(&mut self, job_id: i64, state: JobState) -> SourceResult<()> {
        let filter = format!("eq.{}", job_id);
        let resp = self
            .authed(self.http.patch(self.rest_url(JOBS_TABLE)))
            .query(&[("id", filter.as_str())])
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({ "estado": state.as_wire() }))
            .send()
            .await?;
        Self::check(resp).await?;
        debug!(job_id, state = %state, "Job state written back");
        Ok(())
    }

    async fn probe(&mut self) -> bool {
        self.probe_once().await
    }

    async fn reconnect(&mut self) -> SourceResult<()> {
        for attempt in 1..=self.connect_retries {
            info!(
                attempt,
                total = self.connect_retries,
                "Connecting to job source"
            );
            self.http = Self::build_client()?;
            if self.probe_once().await {
                self.established = true;
                info!("Job source connection established");
                return Ok(());
            }
            if attempt < self.connect_retries {
                tokio::time::sleep(self.connect_retry_delay).await;
            }
        }
        self.established = false;
        Err(SourceError::Unreachable {
            attempts: self.connect_retries,
        })
    }

    async fn fetch_color_catalog(&mut self) -> SourceResult<ColorCatalog> {
        let filter = format!("eq.{}", CATALOG_ROW);
        let resp = self
            .authed(self.http.get(self.rest_url(CATALOG_TABLE)))
            .query(&[("select", "colores_data"), ("id", filter.as_str())])
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await?;
        let row: CatalogRow = Self::check(resp).await?.json().await?;
        Ok(row.colores_data)
    }
}
