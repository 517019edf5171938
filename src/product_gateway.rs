//! Remote catalog gateway.
//!
//! Every operation is one HTTP round trip with no retry. Response bodies are decoded
//! through the typed [`Product`] schema; a body that does not fit is reported as
//! [`AppResponse::ParseError`], never as a partially filled product. The gateway
//! does not touch any local state.

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::app_response::AppResponse;
use crate::config::CatalogConfig;
use crate::product_model::{Product, ProductDraft, ProductId};

const MAX_ERROR_BODY: usize = 500;

/// The five operations of the remote catalog service.
#[async_trait]
pub trait ProductGateway: Send + Sync {
    async fn list_products(&self) -> Result<Vec<Product>, AppResponse>;

    async fn get_product(&self, id: ProductId) -> Result<Product, AppResponse>;

    /// The service assigns the id; callers must not assume any relation to ids they
    /// generated themselves.
    async fn create_product(&self, draft: &ProductDraft) -> Result<Product, AppResponse>;

    /// Echoes `id` on success.
    async fn delete_product(&self, id: ProductId) -> Result<ProductId, AppResponse>;

    /// Full replace, not a partial patch.
    async fn update_product(
        &self,
        id: ProductId,
        draft: &ProductDraft,
    ) -> Result<Product, AppResponse>;
}

/// reqwest-backed gateway.
pub struct HttpProductGateway {
    client: Client,
    base_url: String,
    create_url: String,
}

impl HttpProductGateway {
    pub fn new(config: &CatalogConfig) -> Result<Self, AppResponse> {
        let client = Client::builder().build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &CatalogConfig) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let create_base = config
            .create_base_url
            .as_deref()
            .unwrap_or(&config.base_url)
            .trim_end_matches('/');
        let create_url = format!("{}/{}", create_base, config.create_path.trim_start_matches('/'));

        Self {
            client,
            base_url,
            create_url,
        }
    }

    fn products_url(&self) -> String {
        format!("{}/products", self.base_url)
    }

    fn product_url(&self, id: ProductId) -> String {
        format!("{}/products/{}", self.base_url, id)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        operation: &str,
    ) -> Result<Response, AppResponse> {
        debug!("{} {}", operation, url);
        request.send().await.map_err(|e| {
            let error = AppResponse::from(e);
            AppResponse::NetworkError(format!("Failed to {} at {}: {}", operation, url, error.message()))
        })
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        operation: &str,
    ) -> Result<T, AppResponse> {
        let response = self.send(request, url, operation).await?;
        let body = read_success_body(response, url).await?;
        decode(&body, url)
    }
}

/// Reads the body, turning a non-2xx status into an error carrying the server text.
async fn read_success_body(response: Response, url: &str) -> Result<String, AppResponse> {
    let status = response.status();
    let body = response.text().await.map_err(|e| {
        AppResponse::NetworkError(format!("Failed to read response body from {}: {}", url, e))
    })?;

    if status.is_success() {
        return Ok(body);
    }

    let message = format!("HTTP {} from {}: {}", status.as_u16(), url, truncate(&body));
    if status == StatusCode::NOT_FOUND {
        Err(AppResponse::NotFound(message))
    } else {
        Err(AppResponse::NetworkError(message))
    }
}

fn decode<T: DeserializeOwned>(body: &str, url: &str) -> Result<T, AppResponse> {
    serde_json::from_str(body).map_err(|e| {
        AppResponse::ParseError(format!("Unexpected payload from {}: {}", url, e))
    })
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}

#[async_trait]
impl ProductGateway for HttpProductGateway {
    async fn list_products(&self) -> Result<Vec<Product>, AppResponse> {
        let url = self.products_url();
        let request = self.client.get(&url);
        self.request_json(request, &url, "list products")
            .await
            .map_err(not_found_as_network)
    }

    async fn get_product(&self, id: ProductId) -> Result<Product, AppResponse> {
        let url = self.product_url(id);
        let request = self.client.get(&url);
        self.request_json(request, &url, "get product").await
    }

    async fn create_product(&self, draft: &ProductDraft) -> Result<Product, AppResponse> {
        let url = self.create_url.clone();
        let request = self.client.post(&url).json(draft);
        self.request_json(request, &url, "create product")
            .await
            .map_err(not_found_as_network)
    }

    async fn delete_product(&self, id: ProductId) -> Result<ProductId, AppResponse> {
        let url = self.product_url(id);
        let request = self.client.delete(&url);
        let response = self.send(request, &url, "delete product").await?;
        read_success_body(response, &url)
            .await
            .map_err(not_found_as_network)?;
        Ok(id)
    }

    async fn update_product(
        &self,
        id: ProductId,
        draft: &ProductDraft,
    ) -> Result<Product, AppResponse> {
        let url = self.product_url(id);
        let request = self.client.put(&url).json(draft);
        self.request_json(request, &url, "update product")
            .await
            .map_err(not_found_as_network)
    }
}

// Only a detail lookup distinguishes "missing" from other failures.
fn not_found_as_network(error: AppResponse) -> AppResponse {
    match error {
        AppResponse::NotFound(msg) => AppResponse::NetworkError(msg),
        other => other,
    }
}
