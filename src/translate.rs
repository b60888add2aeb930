use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("translation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("translation endpoint returned {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed translation response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
    pub source_lang: String,
    /// False when the detected language already is the target language.
    pub was_translated: bool,
}

impl Translation {
    fn identity(text: &str) -> Self {
        Self {
            text: text.to_string(),
            source_lang: String::new(),
            was_translated: false,
        }
    }
}

#[async_trait]
pub trait Translate: Send + Sync {
    async fn translate(&self, text: &str, target_lang: &str)
        -> Result<Translation, TranslateError>;
}

/// Client for the public `translate_a/single` endpoint.
pub struct Translator {
    client: reqwest::Client,
    endpoint: String,
}

impl Translator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Translate for Translator {
    async fn translate(
        &self,
        text: &str,
        target_lang: &str,
    ) -> Result<Translation, TranslateError> {
        if text.trim().is_empty() {
            return Ok(Translation::identity(text));
        }

        debug!("Translating {} chars to {}", text.len(), target_lang);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("dt", "t"),
                ("sl", "auto"),
                ("tl", target_lang),
                ("q", text),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranslateError::Status(status));
        }

        let body: Value = response.json().await?;
        parse_response(&body, target_lang)
    }
}

/// Translated text is the concatenation of every `[0][i][0]`; the detected
/// source language sits at `[2]`.
pub fn parse_response(body: &Value, target_lang: &str) -> Result<Translation, TranslateError> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslateError::Malformed("missing segment list".to_string()))?;

    if segments.first().and_then(|s| s.get(0)).and_then(Value::as_str).is_none() {
        return Err(TranslateError::Malformed(
            "missing translated text".to_string(),
        ));
    }
    let text: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect();

    let source_lang = body
        .get(2)
        .and_then(Value::as_str)
        .ok_or_else(|| TranslateError::Malformed("missing detected language".to_string()))?
        .to_string();

    let was_translated = !source_lang.eq_ignore_ascii_case(target_lang);
    Ok(Translation {
        text,
        source_lang,
        was_translated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/translate_a/single", addr)
    }

    /// Pretends every input is Russian and echoes it upper-cased.
    async fn fake_translate(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        let q = params.get("q").cloned().unwrap_or_default();
        let tl = params.get("tl").cloned().unwrap_or_default();
        let sl = if q.starts_with("same:") { tl.clone() } else { "ru".to_string() };
        Json(json!([[[q.to_uppercase(), q, null, null]], null, sl]))
    }

    #[test]
    fn test_parse_single_segment() {
        let body = json!([[["Hello", "Привет", null, null, 10]], null, "ru"]);
        let t = parse_response(&body, "en").unwrap();
        assert_eq!(t.text, "Hello");
        assert_eq!(t.source_lang, "ru");
        assert!(t.was_translated);
    }

    #[test]
    fn test_parse_concatenates_segments() {
        let body = json!([[["Hello. ", "a"], ["Bye.", "b"]], null, "de"]);
        let t = parse_response(&body, "en").unwrap();
        assert_eq!(t.text, "Hello. Bye.");
    }

    #[test]
    fn test_same_language_is_not_translated() {
        let body = json!([[["gg", "gg"]], null, "EN"]);
        let t = parse_response(&body, "en").unwrap();
        assert!(!t.was_translated);
    }

    #[test]
    fn test_parse_rejects_malformed_shapes() {
        assert!(parse_response(&json!({}), "en").is_err());
        assert!(parse_response(&json!([[]]), "en").is_err());
        assert!(parse_response(&json!([[["x"]], null]), "en").is_err());
        assert!(parse_response(&json!([[[1]], null, "ru"]), "en").is_err());
    }

    #[tokio::test]
    async fn test_translate_round_trip() {
        let endpoint = serve(Router::new().route("/translate_a/single", get(fake_translate))).await;
        let translator = Translator::new(endpoint);

        let t = translator.translate("privet & poka", "en").await.unwrap();
        assert_eq!(t.text, "PRIVET & POKA");
        assert!(t.was_translated);

        let t = translator.translate("same:hello", "en").await.unwrap();
        assert!(!t.was_translated);
    }

    #[tokio::test]
    async fn test_translate_error_status() {
        let endpoint = serve(Router::new().route(
            "/translate_a/single",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        ))
        .await;
        let translator = Translator::new(endpoint);
        match translator.translate("hello", "ja").await {
            Err(TranslateError::Status(status)) => {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS)
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_text_skips_request() {
        // Unroutable endpoint: a request would fail.
        let translator = Translator::new("http://127.0.0.1:9/translate_a/single");
        let t = translator.translate("  ", "en").await.unwrap();
        assert!(!t.was_translated);
        assert_eq!(t.text, "  ");
    }
}
