//! Storefront backend client

use crate::api::error::ApiError;
use crate::catalog::{EventDetails, Product, TicketTier};
use crate::config::Config;
use crate::gateway::{ApiResult, StorefrontApi};
use crate::gates::lottery::LotteryStats;
use crate::order::{Order, OrderEnvelope, OrderRequest};
use crate::payment::{PaymentPayload, SettlementReport};
use crate::promo::{PromoValidation, PromoValidationRequest};
use crate::types::{EventId, OrderId, TierId};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Bearer-authenticated JSON client for the storefront backend
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct Success {
    success: bool,
}

#[derive(Deserialize)]
struct Valid {
    valid: bool,
}

#[derive(Deserialize)]
struct Eligible {
    eligible: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WaitlistEntry<'a> {
    event_id: EventId,
    tier_id: TierId,
    email: &'a str,
}

impl RestClient {
    /// Client for `base_url` with reqwest defaults
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: None,
        }
    }

    /// Client built from configuration, with its request timeout
    ///
    /// # Errors
    ///
    /// Returns `ApiError::RequestFailed` if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_owned(),
            token: None,
        })
    }

    /// Attach a bearer token
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Base URL requests are made against
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn dispatch(&self, request: RequestBuilder) -> ApiResult<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ApiError::from_body(status.as_u16(), &body))
            },
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::ResponseParseFailed(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        tracing::trace!(path, "GET");
        let response = self.dispatch(self.client.get(self.url(path))).await?;
        Self::decode(response).await
    }

    async fn post<B: Serialize + Sync + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResult<T> {
        tracing::trace!(path, "POST");
        let response = self.dispatch(self.client.post(self.url(path)).json(body)).await?;
        Self::decode(response).await
    }

    async fn post_ack<B: Serialize + Sync + ?Sized>(&self, path: &str, body: &B) -> ApiResult<()> {
        tracing::trace!(path, "POST");
        self.dispatch(self.client.post(self.url(path)).json(body)).await?;
        Ok(())
    }
}

#[async_trait]
impl StorefrontApi for RestClient {
    async fn event(&self, event_id: EventId) -> ApiResult<EventDetails> {
        self.get(&format!("/events/{event_id}")).await
    }

    async fn tiers(&self, event_id: EventId) -> ApiResult<Vec<TicketTier>> {
        self.get(&format!("/events/{event_id}/tiers")).await
    }

    async fn products(&self, event_id: EventId) -> ApiResult<Vec<Product>> {
        self.get(&format!("/products?eventId={event_id}")).await
    }

    async fn create_order(&self, request: &OrderRequest) -> ApiResult<Order> {
        let body = request
            .body()
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;
        let envelope: OrderEnvelope = self.post(&request.path(), &body).await?;
        Ok(envelope.order)
    }

    async fn validate_promo(&self, request: &PromoValidationRequest) -> ApiResult<PromoValidation> {
        self.post("/promo/validate", request).await
    }

    async fn initiate_payment(
        &self,
        order_id: OrderId,
        payload: &PaymentPayload,
    ) -> ApiResult<serde_json::Value> {
        self.post(&format!("/payments/initiate/{order_id}"), payload).await
    }

    async fn payment_status(&self, order_id: OrderId) -> ApiResult<SettlementReport> {
        self.get(&format!("/payments/status/{order_id}")).await
    }

    async fn verify_paystack(&self, reference: &str) -> ApiResult<bool> {
        let reply: Success = self.get(&format!("/payments/paystack/verify/{reference}")).await?;
        Ok(reply.success)
    }

    async fn lottery_eligibility(&self, event_id: EventId) -> ApiResult<bool> {
        let reply: Eligible = self.get(&format!("/lottery/eligible/{event_id}")).await?;
        Ok(reply.eligible)
    }

    async fn enter_lottery(&self, event_id: EventId) -> ApiResult<()> {
        self.post_ack(&format!("/lottery/enter/{event_id}"), &json!({})).await
    }

    async fn lottery_stats(&self, event_id: EventId) -> ApiResult<LotteryStats> {
        self.get(&format!("/lottery/event/{event_id}/stats")).await
    }

    async fn join_waitlist(&self, event_id: EventId, tier_id: TierId, email: &str) -> ApiResult<()> {
        self.post_ack(
            "/waitlist",
            &WaitlistEntry {
                event_id,
                tier_id,
                email,
            },
        )
        .await
    }

    async fn verify_access(&self, event_id: EventId, code: &str) -> ApiResult<bool> {
        let reply: Valid = self
            .post(&format!("/events/{event_id}/verify-access"), &json!({ "code": code }))
            .await?;
        Ok(reply.valid)
    }
}
