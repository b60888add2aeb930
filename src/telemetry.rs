use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// One chat line from the game's `/gamechat` feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub enemy: bool,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub time: i64,
}

/// Incremental source of chat messages.
///
/// Implementations return only messages with `id > last_id`, in ascending
/// order. A failed fetch is reported as an empty batch.
#[async_trait]
pub trait ChatFeed: Send + Sync {
    async fn fetch_since(&self, last_id: i64) -> Vec<ChatMessage>;
}

/// HTTP client for the game's local telemetry server.
pub struct TelemetryClient {
    client: reqwest::Client,
    base_url: String,
}

impl TelemetryClient {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .context("Failed to build telemetry HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn try_fetch(&self, last_id: i64) -> Result<Vec<ChatMessage>> {
        let url = format!("{}/gamechat", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("lastId", last_id)])
            .send()
            .await
            .context("Failed to reach telemetry server")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Telemetry server returned {}", status);
        }

        response
            .json()
            .await
            .context("Failed to parse gamechat response")
    }
}

#[async_trait]
impl ChatFeed for TelemetryClient {
    async fn fetch_since(&self, last_id: i64) -> Vec<ChatMessage> {
        match self.try_fetch(last_id).await {
            Ok(messages) => messages,
            Err(e) => {
                debug!("No chat from telemetry (lastId={}): {:#}", last_id, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Serves a fixed chat log, honoring `lastId` like the game does.
    async fn gamechat(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        let last_id: i64 = params
            .get("lastId")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let log = vec![
            json!({"id": 1, "msg": "<b>gg</b>", "sender": "P1", "enemy": false, "mode": "All", "time": 12}),
            json!({"id": 2, "msg": "o7", "sender": "P2", "enemy": true, "mode": "All", "time": 15}),
            json!({"id": 3, "msg": "hi", "sender": "P3", "enemy": false, "mode": "Team", "time": 20}),
        ];
        Json(Value::Array(
            log.into_iter()
                .filter(|m| m["id"].as_i64().unwrap_or(0) > last_id)
                .collect(),
        ))
    }

    #[tokio::test]
    async fn test_fetch_since_passes_cursor() {
        let base = serve(Router::new().route("/gamechat", get(gamechat))).await;
        let client = TelemetryClient::new(base, None).unwrap();

        let all = client.fetch_since(0).await;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].msg, "<b>gg</b>");
        assert_eq!(all[1].sender, "P2");
        assert!(all[1].enemy);
        assert_eq!(all[2].mode, "Team");
        assert_eq!(all[2].time, 20);

        let newer = client.fetch_since(2).await;
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].id, 3);

        assert!(client.fetch_since(3).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_optional_fields_default() {
        let base = serve(Router::new().route(
            "/gamechat",
            get(|| async { Json(json!([{"id": 7, "msg": "hello"}])) }),
        ))
        .await;
        let client = TelemetryClient::new(base, None).unwrap();

        let messages = client.fetch_since(0).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, 7);
        assert_eq!(messages[0].sender, "");
        assert!(!messages[0].enemy);
    }

    #[tokio::test]
    async fn test_malformed_response_is_empty() {
        let base = serve(Router::new().route("/gamechat", get(|| async { "not json" }))).await;
        let client = TelemetryClient::new(base, None).unwrap();
        assert!(client.fetch_since(0).await.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_is_empty() {
        let base = serve(Router::new().route(
            "/gamechat",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        ))
        .await;
        let client = TelemetryClient::new(base, None).unwrap();
        assert!(client.fetch_since(0).await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_empty() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = TelemetryClient::new(
            format!("http://{}", addr),
            Some(Duration::from_secs(2)),
        )
        .unwrap();
        assert!(client.fetch_since(0).await.is_empty());
    }
}
