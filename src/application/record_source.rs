// Source trait for reading records from the remote sheet
use crate::domain::image::ImageBlob;
use crate::domain::record::RawRecord;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("source returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("source reported error: {0}")]
    Payload(String),
    #[error("undecodable payload: {0}")]
    Decode(String),
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: Box<FetchError>,
    },
}

#[async_trait]
pub trait RecordSource: Send + Sync {
    /// One full-table read. No retry at this level.
    async fn fetch_records(&self) -> Result<Vec<RawRecord>, FetchError>;

    /// Fetch an image blob by drive file id
    async fn fetch_image(&self, file_id: &str) -> Result<ImageBlob, FetchError>;
}
