mod google;
mod openai;
mod traits;

pub use google::{GOOGLE_TRANSLATE_URL, GoogleTranslator};
pub use openai::OpenAiTranslator;
pub use traits::{Translator, TranslatorInfo};

use reqwest::{Response, StatusCode};
use std::sync::Arc;
use tracing::warn;

use crate::config::{Provider, TranslatorConfig};
use crate::error::{Error, Result};

/// Create a translator from configuration
pub fn create_translator(config: &TranslatorConfig) -> Result<Arc<dyn Translator>> {
    let translator: Arc<dyn Translator> = match config.provider {
        Provider::Google => Arc::new(GoogleTranslator::from_config(config)?),
        Provider::OpenAi => Arc::new(OpenAiTranslator::from_config(config)?),
    };
    Ok(translator)
}

/// Map a transport failure to a provider error.
fn map_send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::ProviderTimeout
    } else {
        Error::ProviderRequest(e.to_string())
    }
}

/// Pass successful responses through; turn 429 into a retryable error and
/// everything else into a request failure.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        warn!("Provider rate limited, retry after {:?}s", retry_after);
        return Err(Error::ProviderRateLimited { retry_after });
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::ProviderMissingApiKey);
    }

    let body = response.text().await.unwrap_or_default();
    warn!("Provider error: {} - {}", status, body);
    Err(Error::ProviderRequest(format!("HTTP {status}: {body}")))
}
