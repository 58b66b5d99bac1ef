use crate::{Result, SyncError};
use reqwest::multipart;
use serde::Deserialize;
use std::path::Path;
use tokio_util::io::ReaderStream;

/// Structured success response from the receiver.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub s3_key: String,
    pub size: i64,
}

/// Client side of the upload boundary: streams one file per call in a
/// multipart envelope with a bearer credential. Holds no state between
/// calls beyond the connection pool inside [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct Uploader {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl Uploader {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// POST the file at `local_path` to `{base_url}/upload` under
    /// `remote_path`. Any non-2xx status, transport failure, or decode
    /// failure is an error.
    pub async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<UploadResponse> {
        let file = tokio::fs::File::open(local_path).await?;
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        let part = multipart::Part::stream(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .file_name(file_name);
        let form = multipart::Form::new()
            .part("file", part)
            .text("path", remote_path.to_string());

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::UploadRejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<UploadResponse>().await?)
    }
}
