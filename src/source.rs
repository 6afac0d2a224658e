use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Connectivity(#[from] reqwest::Error),
    #[error("{url} answered {status}")]
    Status { url: String, status: StatusCode },
    #[error("server returned an empty image id")]
    EmptyId,
    #[error("unsupported content type {0:?}")]
    UnsupportedType(String),
    #[error(transparent)]
    Decode(#[from] image::ImageError),
}

/// Where images come from: the id of the image that should be on screen
/// now, and the decoded image for an id.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn check_connected(&self) -> bool;
    async fn current_id(&self) -> Result<String, SourceError>;
    async fn image(&self, id: &str) -> Result<DynamicImage, SourceError>;
}

#[derive(Debug, Clone)]
pub struct HttpImageSource {
    client: Client,
    endpoint: String,
}

impl HttpImageSource {
    pub fn new(endpoint: &str) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(HttpImageSource {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get(&self, url: String) -> Result<reqwest::Response, SourceError> {
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(SourceError::Status { url, status });
        }
        Ok(response)
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn check_connected(&self) -> bool {
        match self.client.get(&self.endpoint).send().await {
            Ok(response) => response.status().as_u16() <= 300,
            Err(e) => {
                debug!("connectivity check failed: {}", e);
                false
            }
        }
    }

    async fn current_id(&self) -> Result<String, SourceError> {
        let body = self.get(format!("{}/now/id", self.endpoint)).await?.text().await?;
        parse_id(&body)
    }

    async fn image(&self, id: &str) -> Result<DynamicImage, SourceError> {
        let response = self.get(format!("{}/image/{}", self.endpoint, id)).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let bytes = response.bytes().await?;
        decode_image(content_type.as_deref(), &bytes)
    }
}

pub fn parse_id(body: &str) -> Result<String, SourceError> {
    match body.trim() {
        "" => Err(SourceError::EmptyId),
        id => Ok(id.to_string()),
    }
}

/// Decodes `bytes` according to a `Content-Type` value; parameters after
/// `;` are ignored.
pub fn decode_image(content_type: Option<&str>, bytes: &[u8]) -> Result<DynamicImage, SourceError> {
    let content_type = content_type.unwrap_or_default();
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let format = match mime.as_str() {
        "image/jpeg" | "image/jpg" => ImageFormat::Jpeg,
        "image/gif" => ImageFormat::Gif,
        _ => return Err(SourceError::UnsupportedType(content_type.to_string())),
    };
    Ok(image::load_from_memory_with_format(bytes, format)?)
}
