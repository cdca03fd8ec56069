use std::collections::HashMap;
use std::time::Duration;

use bigdecimal::BigDecimal;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum RateProviderError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("provider rejected the request: {0}")]
    ProviderError(String),
    #[error("invalid response from rate provider: {0}")]
    InvalidResponse(String),
    #[error("circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// Response from the provider's /latest endpoint. Rates are quoted against
/// the requested base currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatesResponse {
    pub success: bool,
    pub base: Option<String>,
    #[serde(default)]
    pub rates: HashMap<String, BigDecimal>,
    pub date: Option<String>,
    pub error: Option<ProviderErrorDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderErrorDetails {
    pub code: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub info: Option<String>,
}

/// HTTP client for the external exchange-rate provider.
#[derive(Clone)]
pub struct RateProviderClient {
    client: Client,
    base_url: String,
    api_key: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl RateProviderClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(Duration::from_secs(60), Duration::from_secs(120));
        let policy = failure_policy::consecutive_failures(3, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        RateProviderClient {
            client,
            base_url,
            api_key,
            circuit_breaker,
        }
    }

    /// Provider identifier recorded alongside stored rates.
    pub fn source_name(&self) -> &str {
        self.base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
    }

    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    /// Fetches the latest rates for `base` against all of `symbols` in one
    /// call. Transport failures, provider-level failures (`success=false`)
    /// and malformed bodies are reported distinctly.
    pub async fn fetch_latest(
        &self,
        base: &str,
        symbols: &[String],
    ) -> Result<RatesResponse, RateProviderError> {
        let url = format!("{}/latest", self.base_url.trim_end_matches('/'));
        let client = self.client.clone();
        let query = [
            ("base".to_string(), base.to_string()),
            ("symbols".to_string(), symbols.join(",")),
            ("access_key".to_string(), self.api_key.clone()),
        ];

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.get(&url).query(&query).send().await?;

                if !response.status().is_success() {
                    return Err(RateProviderError::InvalidResponse(format!(
                        "HTTP {}",
                        response.status()
                    )));
                }

                let body = response.json::<RatesResponse>().await?;

                if !body.success {
                    let info = body
                        .error
                        .as_ref()
                        .and_then(|details| details.info.clone())
                        .unwrap_or_else(|| "unknown provider error".to_string());
                    return Err(RateProviderError::ProviderError(info));
                }

                if body.base.is_none() || body.rates.is_empty() {
                    return Err(RateProviderError::InvalidResponse(
                        "response is missing base or rates".to_string(),
                    ));
                }

                Ok(body)
            })
            .await;

        match result {
            Ok(body) => Ok(body),
            Err(FailsafeError::Rejected) => Err(RateProviderError::CircuitBreakerOpen(
                "rate provider circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_starts_with_closed_circuit() {
        let client = RateProviderClient::new(
            "https://api.exchangerate.host".to_string(),
            "key".to_string(),
        );
        assert_eq!(client.circuit_state(), "closed");
    }
}
