//! Korean → English translation with bounded retry and passthrough fallback.
//!
//! # Architecture
//!
//! - [`Translate`]: one call to a translation backend
//! - [`DeepLClient`]: the DeepL REST implementation
//! - [`RetryTranslate`]: decorator retrying any [`Translate`] a fixed number of times
//! - [`Translator`]: the façade used by the pipeline; never fails, and falls
//!   back to the untranslated text when every attempt errors
//!
//! Retries are immediate. DeepL failures here are nearly always quota or
//! auth problems, where waiting does not help.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::utils::truncate_for_log;

/// Attempts per fragment before falling back to the source text.
pub const MAX_ATTEMPTS: usize = 3;

pub const SOURCE_LANG: &str = "KO";
pub const TARGET_LANG: &str = "EN-US";

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("translation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("translation backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("translation backend returned no translations")]
    Empty,
}

/// A translation backend.
pub trait Translate {
    /// Translate `text` from `source` to `target` language codes.
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslateError>;
}

/// Retries the wrapped backend up to `max_attempts` times.
pub struct RetryTranslate<T> {
    inner: T,
    max_attempts: usize,
}

impl<T: Translate> RetryTranslate<T> {
    pub fn new(inner: T, max_attempts: usize) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
        }
    }
}

impl<T> fmt::Debug for RetryTranslate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryTranslate")
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl<T: Translate> Translate for RetryTranslate<T> {
    #[instrument(level = "debug", skip_all)]
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslateError> {
        let mut attempt = 0usize;
        loop {
            let t0 = Instant::now();
            match self.inner.translate(text, source, target).await {
                Ok(translated) => return Ok(translated),
                Err(e) => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        elapsed_ms = t0.elapsed().as_millis() as u64,
                        error = %e,
                        "Translation attempt failed"
                    );
                    if attempt >= self.max_attempts {
                        return Err(e);
                    }
                }
            }
        }
    }
}

/// Best-effort translator used throughout the pipeline.
///
/// The returned text is the translation when the backend succeeds and the
/// input otherwise; callers must not assume English output.
#[derive(Debug)]
pub struct Translator<T> {
    backend: RetryTranslate<T>,
    source: String,
    target: String,
}

impl<T: Translate> Translator<T> {
    /// Korean to English over `backend`, with retries.
    pub fn new(backend: T) -> Self {
        Self::with_languages(backend, SOURCE_LANG, TARGET_LANG)
    }

    /// Like [`new`](Self::new) with a different default language pair.
    pub fn with_languages(backend: T, source: &str, target: &str) -> Self {
        Self {
            backend: RetryTranslate::new(backend, MAX_ATTEMPTS),
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    /// Translate with the configured language pair.
    pub async fn translate(&self, text: &str) -> String {
        self.translate_between(text, &self.source, &self.target).await
    }

    /// Translate with an explicit language pair.
    ///
    /// Blank input is returned unchanged without calling the backend. When
    /// every attempt fails the error is logged and the input comes back as
    /// is, so the result is never empty for non-empty input.
    ///
    /// # Arguments
    ///
    /// * `text` - Text to translate
    /// * `source` - DeepL source language code, e.g. `KO`
    /// * `target` - DeepL target language code, e.g. `EN`
    ///
    /// # Returns
    ///
    /// The translation, or `text` itself on failure.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let translator = Translator::new(DeepLClient::new(client, &key));
    /// let english = translator.translate_between("맛있어요", "KO", "EN").await;
    /// ```
    pub async fn translate_between(&self, text: &str, source: &str, target: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }
        match self.backend.translate(text, source, target).await {
            Ok(translated) => {
                debug!(chars = text.chars().count(), "Translated fragment");
                translated
            }
            Err(e) => {
                error!(
                    error = %e,
                    text = %truncate_for_log(text, 50),
                    "Translation failed; keeping source text"
                );
                text.to_string()
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct DeepLRequest<'a> {
    text: [&'a str; 1],
    source_lang: &'a str,
    target_lang: &'a str,
}

#[derive(Debug, Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    text: String,
}

/// DeepL REST API client.
pub struct DeepLClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl DeepLClient {
    /// A client for `api_key`, choosing the endpoint from the key.
    pub fn new(client: reqwest::Client, api_key: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            endpoint: Self::endpoint_for(api_key).to_string(),
        }
    }

    /// Free-tier keys carry a `:fx` suffix and live on a separate host.
    pub fn endpoint_for(api_key: &str) -> &'static str {
        if api_key.ends_with(":fx") {
            "https://api-free.deepl.com/v2/translate"
        } else {
            "https://api.deepl.com/v2/translate"
        }
    }
}

impl fmt::Debug for DeepLClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepLClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Translate for DeepLClient {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslateError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .json(&DeepLRequest {
                text: [text],
                source_lang: source,
                target_lang: target,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&body, 200),
            });
        }

        let parsed: DeepLResponse = response.json().await?;
        parsed
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or(TranslateError::Empty)
    }
}
