//! REST implementation of [`BuylistBackend`] over `reqwest`.

use std::sync::Arc;

use async_trait::async_trait;
use buylist_core::{
    Cart, CartId, CartName, CartSummary, VendorOfferBreakdown, VendorSlug,
};
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use super::{
    BackendError, BuylistBackend, CartNameBody, ItemUpdate, SubmitRequest, SubmitResponse,
};
use crate::config::BackendConfig;

/// Longest slice of a response body that is logged or carried in errors.
const BODY_EXCERPT_CHARS: usize = 500;

/// Client for the buylist REST backend.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct HttpBackend {
    inner: Arc<HttpBackendInner>,
}

struct HttpBackendInner {
    client: reqwest::Client,
    base_url: Url,
    api_token: Option<SecretString>,
}

impl HttpBackend {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        // Url::join drops the last path segment unless the base ends in '/'
        let mut base_url = config.base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            inner: Arc::new(HttpBackendInner {
                client,
                base_url,
                api_token: config.api_token.clone(),
            }),
        })
    }

    /// Base URL all endpoint paths are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, BackendError> {
        let url = self.inner.base_url.join(path)?;
        let mut builder = self.inner.client.request(method, url);
        if let Some(token) = &self.inner.api_token {
            builder = builder.bearer_auth(token.expose_secret());
        }
        Ok(builder)
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<String, BackendError> {
        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(BackendError::RateLimited(retry_after));
        }

        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        let excerpt = excerpt(&body);
        match status {
            StatusCode::NOT_FOUND => Err(BackendError::NotFound(what.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(BackendError::Unauthorized(excerpt))
            }
            _ => {
                tracing::error!(
                    status = %status,
                    body = %excerpt,
                    "Buylist backend returned non-success status"
                );
                Err(BackendError::Api {
                    status: status.as_u16(),
                    message: excerpt,
                })
            }
        }
    }

    /// Send a request and parse a JSON body from the successful response.
    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T, BackendError> {
        let body = self.send(builder, what).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %excerpt(&body),
                "Failed to parse buylist backend response"
            );
            BackendError::Parse(e.to_string())
        })
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}

#[async_trait]
impl BuylistBackend for HttpBackend {
    #[instrument(skip(self))]
    async fn list_carts(&self) -> Result<Vec<CartSummary>, BackendError> {
        let builder = self.request(Method::GET, "carts")?;
        self.send_json(builder, "carts").await
    }

    #[instrument(skip(self), fields(name = %name))]
    async fn create_cart(&self, name: &CartName) -> Result<Cart, BackendError> {
        let builder = self.request(Method::POST, "carts")?.json(&CartNameBody {
            name: name.clone(),
        });
        self.send_json(builder, "carts").await
    }

    #[instrument(skip(self), fields(cart_id = %cart_id, name = %name))]
    async fn rename_cart(&self, cart_id: CartId, name: &CartName) -> Result<Cart, BackendError> {
        let path = format!("carts/{cart_id}");
        let builder = self.request(Method::PATCH, &path)?.json(&CartNameBody {
            name: name.clone(),
        });
        self.send_json(builder, &path).await
    }

    #[instrument(skip(self), fields(cart_id = %cart_id))]
    async fn delete_cart(&self, cart_id: CartId) -> Result<(), BackendError> {
        let path = format!("carts/{cart_id}");
        let builder = self.request(Method::DELETE, &path)?;
        self.send(builder, &path).await.map(|_| ())
    }

    #[instrument(skip(self), fields(cart_id = %cart_id))]
    async fn get_cart(&self, cart_id: CartId) -> Result<Cart, BackendError> {
        let path = format!("carts/{cart_id}");
        let builder = self.request(Method::GET, &path)?;
        self.send_json(builder, &path).await
    }

    #[instrument(skip(self, update), fields(cart_id = %cart_id, card = %update.identity, quantity = update.quantity))]
    async fn update_item(&self, cart_id: CartId, update: &ItemUpdate) -> Result<(), BackendError> {
        let path = format!("carts/{cart_id}/items");
        let builder = self.request(Method::PATCH, &path)?.json(update);
        self.send(builder, &path).await?;
        debug!("Cart line persisted");
        Ok(())
    }

    #[instrument(skip(self), fields(cart_id = %cart_id))]
    async fn get_offers(&self, cart_id: CartId) -> Result<Vec<VendorOfferBreakdown>, BackendError> {
        let path = format!("carts/{cart_id}/offers");
        let builder = self.request(Method::GET, &path)?;
        self.send_json(builder, &path).await
    }

    #[instrument(skip(self))]
    async fn connected_vendors(&self) -> Result<Vec<VendorSlug>, BackendError> {
        let builder = self.request(Method::GET, "connected-vendors")?;
        self.send_json(builder, "connected-vendors").await
    }

    #[instrument(
        skip(self, request),
        fields(
            cart_id = %request.cart_id,
            vendor = %request.vendor_slug,
            payment_method = %request.payment_method,
            submission_id = %request.submission_id,
        )
    )]
    async fn submit_buylist(
        &self,
        request: &SubmitRequest,
    ) -> Result<SubmitResponse, BackendError> {
        let builder = self
            .request(Method::POST, "buylists/submit")?
            .header("X-Submission-Id", request.submission_id.to_string())
            .json(request);
        self.send_json(builder, "buylists/submit").await
    }
}
