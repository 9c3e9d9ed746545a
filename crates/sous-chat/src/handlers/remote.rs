//! Capabilities served by remote JSON services.
//!
//! The video service turns an external video link into a recipe; the product
//! service searches the catalog by text and optionally an attached image.
//! Both are plain `POST` endpoints; failures are retried once.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

use crate::capability::{Capability, CapabilityHandler, CapabilityOutput, CapabilityRequest};
use crate::completion::retry_once;
use crate::error::ChatError;

#[derive(Debug, Serialize)]
struct VideoRequest<'a> {
    youtube_url: &'a str,
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct ProductSearchRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

/// HTTP-backed handler for `video_recipe` or `product_search`.
#[derive(Debug, Clone)]
pub struct RemoteCapability {
    capability: Capability,
    client: Client,
    endpoint: String,
}

impl RemoteCapability {
    pub fn new(capability: Capability, endpoint: &str, timeout_secs: u64) -> Result<Self, ChatError> {
        if !matches!(capability, Capability::VideoRecipe | Capability::ProductSearch) {
            return Err(ChatError::Config(format!(
                "{} is not served by a remote endpoint",
                capability
            )));
        }
        if endpoint.trim().is_empty() {
            return Err(ChatError::Config(format!("empty endpoint for {}", capability)));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            capability,
            client,
            endpoint: endpoint.trim().to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post<B: Serialize + ?Sized>(&self, body: &B) -> Result<Value, ChatError> {
        let response = self.client.post(&self.endpoint).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::UpstreamHttp {
                status: Some(status.as_u16()),
                message: format!("{} returned HTTP {}", self.capability, status),
            });
        }
        let value = response.json::<Value>().await.map_err(|e| {
            ChatError::MalformedCompletion(format!("{} response is not JSON: {}", self.capability, e))
        })?;
        Ok(value)
    }

    async fn video_recipe(&self, request: &CapabilityRequest) -> Result<Value, ChatError> {
        let url = request
            .arg_str("url")
            .ok_or_else(|| ChatError::InvalidArguments("missing argument: url".to_string()))?;
        let body = VideoRequest {
            youtube_url: url,
            message: request.arg_str("message").unwrap_or(url),
        };
        tracing::info!(url = %url, "Requesting recipe from video service");
        retry_once("video_recipe", || self.post(&body)).await
    }

    async fn product_search(&self, request: &CapabilityRequest) -> Result<Value, ChatError> {
        let query = request
            .arg_str("query")
            .or_else(|| request.arg_str("message"))
            .unwrap_or_default();
        let image = request.arg_str("image");
        if query.is_empty() && image.is_none() {
            return Err(ChatError::InvalidArguments(
                "product search needs a query or an image".to_string(),
            ));
        }
        let body = ProductSearchRequest { query, image };
        tracing::info!(query = %query, with_image = image.is_some(), "Searching products");
        let value = retry_once("product_search", || self.post(&body)).await?;

        let results = match value {
            Value::Object(mut fields) => fields.remove("results").unwrap_or(Value::Array(Vec::new())),
            Value::Array(items) => Value::Array(items),
            _ => Value::Array(Vec::new()),
        };
        Ok(json!({ "query": query, "results": results }))
    }
}

#[async_trait]
impl CapabilityHandler for RemoteCapability {
    fn capability(&self) -> Capability {
        self.capability
    }

    async fn invoke(&self, request: &CapabilityRequest) -> Result<CapabilityOutput, ChatError> {
        let value = match self.capability {
            Capability::VideoRecipe => self.video_recipe(request).await?,
            _ => self.product_search(request).await?,
        };
        Ok(CapabilityOutput::Structured(value))
    }
}
