use async_trait::async_trait;
use gather_core::{CreateOrderRequest, GatewayError, GatewayOrder, PaymentGateway};
use gather_shared::Masked;
use serde::Deserialize;
use std::time::Duration;

/// Razorpay-style orders API over HTTPS with basic auth.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: Masked<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: Masked<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret,
        })
    }

    async fn decode(response: reqwest::Response) -> Result<GatewayOrder, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<GatewayOrder>()
                .await
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(GatewayError::Unauthorized(message));
        }
        Err(GatewayError::Rejected { status: status.as_u16(), message })
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(e.to_string())
    }
}

/// Gateway errors come back as `{"error": {"code", "description"}}`; pass
/// the description through as-is.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error: ErrorBody { code, description: Some(d) } }) => match code {
            Some(code) => format!("{}: {}", code, d),
            None => d,
        },
        Ok(ErrorEnvelope { error: ErrorBody { code: Some(code), description: None } }) => code,
        _ if body.trim().is_empty() => "empty response".to_string(),
        _ => body.trim().chars().take(200).collect(),
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let response = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(self.key_secret.expose()))
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        Self::decode(response).await
    }

    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError> {
        let response = self
            .client
            .get(format!("{}/v1/orders/{}", self.base_url, order_id))
            .basic_auth(&self.key_id, Some(self.key_secret.expose()))
            .send()
            .await
            .map_err(transport_error)?;

        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_description_surfaces_verbatim() {
        let body = r#"{"error":{"code":"BAD_REQUEST_ERROR","description":"The amount must be atleast INR 1.00","source":"business"}}"#;
        assert_eq!(error_message(body), "BAD_REQUEST_ERROR: The amount must be atleast INR 1.00");
    }

    #[test]
    fn test_unstructured_error_bodies() {
        assert_eq!(error_message(""), "empty response");
        assert_eq!(error_message("<html>bad gateway</html>"), "<html>bad gateway</html>");
        assert_eq!(error_message(r#"{"error":{"code":"SERVER_ERROR"}}"#), "SERVER_ERROR");
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let gateway = HttpPaymentGateway::new(
            "https://api.example.test/",
            "key",
            Masked("secret".to_string()),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(gateway.base_url, "https://api.example.test");
    }
}
