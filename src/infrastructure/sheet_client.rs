// Sheet web-app client
use crate::application::record_source::{FetchError, RecordSource};
use crate::domain::image::ImageBlob;
use crate::domain::record::RawRecord;
use async_trait::async_trait;
use reqwest::header;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SheetClient {
    endpoint: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataPayload {
    Error { error: String },
    Records(Vec<RawRecord>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImagePayload {
    Error { error: String },
    Image(ImageBlob),
}

impl SheetClient {
    pub fn new(endpoint: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn data_url(&self, cache_buster: i64) -> String {
        format!("{}?action=getData&v={}", self.endpoint, cache_buster)
    }

    fn image_url(&self, file_id: &str) -> String {
        format!(
            "{}?action=getImage&id={}",
            self.endpoint,
            urlencoding::encode(file_id)
        )
    }

    async fn get_body(&self, url: &str, no_cache: bool) -> Result<String, FetchError> {
        let mut request = self
            .http
            .get(url)
            .header(header::ACCEPT, "application/json");
        if no_cache {
            request = request.header(header::CACHE_CONTROL, "no-cache");
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        Ok(response.text().await?)
    }
}

fn decode_records(body: &str) -> Result<Vec<RawRecord>, FetchError> {
    match serde_json::from_str::<DataPayload>(body) {
        Ok(DataPayload::Records(records)) => Ok(records),
        Ok(DataPayload::Error { error }) => Err(FetchError::Payload(error)),
        Err(e) => Err(FetchError::Decode(e.to_string())),
    }
}

fn decode_image(body: &str) -> Result<ImageBlob, FetchError> {
    match serde_json::from_str::<ImagePayload>(body) {
        Ok(ImagePayload::Image(blob)) => Ok(blob),
        Ok(ImagePayload::Error { error }) => Err(FetchError::Payload(error)),
        Err(e) => Err(FetchError::Decode(e.to_string())),
    }
}

#[async_trait]
impl RecordSource for SheetClient {
    async fn fetch_records(&self) -> Result<Vec<RawRecord>, FetchError> {
        let url = self.data_url(chrono::Utc::now().timestamp_millis());
        tracing::debug!("Requesting {}", url);
        let body = self.get_body(&url, true).await?;
        decode_records(&body)
    }

    async fn fetch_image(&self, file_id: &str) -> Result<ImageBlob, FetchError> {
        let body = self.get_body(&self.image_url(file_id), false).await?;
        decode_image(&body)
    }
}
