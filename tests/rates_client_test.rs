use bigdecimal::BigDecimal;
use std::str::FromStr;

use ledger_core::rates::{RateProviderClient, RateProviderError};

fn symbols() -> Vec<String> {
    vec!["EUR".to_string(), "KZT".to_string()]
}

#[tokio::test]
async fn fetches_and_parses_latest_rates() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/latest")
        .match_query(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("base".into(), "USD".into()),
            mockito::Matcher::UrlEncoded("symbols".into(), "EUR,KZT".into()),
            mockito::Matcher::UrlEncoded("access_key".into(), "test-key".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "success": true,
                "base": "USD",
                "date": "2026-08-29",
                "rates": { "EUR": 0.912345, "KZT": 493.25 }
            }"#,
        )
        .create_async()
        .await;

    let client = RateProviderClient::new(server.url(), "test-key".to_string());
    let response = client.fetch_latest("USD", &symbols()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.base.as_deref(), Some("USD"));
    assert_eq!(
        response.rates.get("EUR"),
        Some(&BigDecimal::from_str("0.912345").unwrap())
    );
    assert_eq!(
        response.rates.get("KZT"),
        Some(&BigDecimal::from_str("493.25").unwrap())
    );
}

#[tokio::test]
async fn reports_provider_level_failure() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/latest")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "success": false,
                "error": { "code": "101", "type": "invalid_access_key", "info": "invalid access key supplied" }
            }"#,
        )
        .create_async()
        .await;

    let client = RateProviderClient::new(server.url(), "bad-key".to_string());
    let err = client.fetch_latest("USD", &symbols()).await.unwrap_err();

    match err {
        RateProviderError::ProviderError(info) => {
            assert!(info.contains("invalid access key"));
        }
        other => panic!("expected ProviderError, got {other:?}"),
    }
}

#[tokio::test]
async fn reports_http_errors() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/latest")
        .match_query(mockito::Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let client = RateProviderClient::new(server.url(), "test-key".to_string());
    let err = client.fetch_latest("USD", &symbols()).await.unwrap_err();

    match err {
        RateProviderError::InvalidResponse(message) => {
            assert!(message.contains("500"));
        }
        other => panic!("expected InvalidResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn rejects_bodies_without_rates() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/latest")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{ "success": true, "base": "USD", "date": "2026-08-29", "rates": {} }"#)
        .create_async()
        .await;

    let client = RateProviderClient::new(server.url(), "test-key".to_string());
    let err = client.fetch_latest("USD", &symbols()).await.unwrap_err();

    assert!(matches!(err, RateProviderError::InvalidResponse(_)));
}
