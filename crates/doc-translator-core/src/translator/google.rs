use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::{Lang, TranslatorConfig};
use crate::error::{Error, Result};
use super::traits::{Translator, TranslatorInfo};

/// Public Google Translate endpoint used by the browser extension client.
pub const GOOGLE_TRANSLATE_URL: &str = "https://translate.googleapis.com/translate_a/single";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Google Translate (`client=gtx`) translator. No API key required.
pub struct GoogleTranslator {
    client: Client,
    endpoint: String,
}

impl GoogleTranslator {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_endpoint(GOOGLE_TRANSLATE_URL, timeout)
    }

    /// Point the translator at a compatible endpoint (proxies, test servers).
    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::ProviderRequest(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &TranslatorConfig) -> Result<Self> {
        Self::new(Duration::from_secs(config.timeout_secs))
    }
}

/// Concatenate the translated segments of a `dt=t` response.
///
/// The body looks like `[[["Hello ","Hola ",null,null,10],["world","mundo",...]],null,"es",...]`.
fn parse_response(body: &Value) -> Result<String> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| Error::ProviderInvalidResponse("missing translation segments".to_string()))?;

    let translated: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect();

    if translated.is_empty() {
        return Err(Error::ProviderInvalidResponse("empty translation".to_string()));
    }
    Ok(translated)
}

#[async_trait]
impl Translator for GoogleTranslator {
    fn info(&self) -> TranslatorInfo {
        TranslatorInfo {
            name: "Google Translate",
            requires_api_key: false,
            supports_auto_detect: true,
        }
    }

    async fn translate(&self, text: &str, source: &Lang, target: &Lang) -> Result<String> {
        if text.trim().is_empty() || source == target {
            return Ok(text.to_string());
        }

        debug!("Google Translate request {} -> {} ({} chars)", source, target, text.len());

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", source.as_str()),
                ("tl", target.as_str()),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(super::map_send_error)?;

        let body: Value = super::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::ProviderInvalidResponse(e.to_string()))?;

        parse_response(&body)
    }
}
