//! Suggested travel courses around a post's address, generated by an LLM.
//!
//! One request per post, no retries, 30 second timeout. Failures are returned
//! as [`ItineraryError`] and the post is published without the section.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::models::BilingualDocument;
use crate::translate::{Translate, Translator};
use crate::utils::truncate_for_log;

pub const PERPLEXITY_URL: &str = "https://api.perplexity.ai/chat/completions";
pub const PERPLEXITY_MODEL: &str = "sonar";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const HEADING_KO: &str = "\n# 여행 코스 추천";
pub const HEADING_EN: &str = "\n# Seoul Travel Guide Recommendation by Korean";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ItineraryError {
    #[error("no API key configured for the itinerary model")]
    MissingCredentials,
    #[error("itinerary request timed out")]
    Timeout,
    #[error("itinerary model returned HTTP {0}")]
    HttpError(u16),
    #[error("itinerary request failed: {0}")]
    Network(String),
    #[error("unexpected itinerary response: {0}")]
    MalformedResponse(String),
}

/// A single-prompt text generation backend.
pub trait GenerateText {
    async fn complete(&self, prompt: &str) -> Result<String, ItineraryError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    content: String,
}

/// Perplexity chat-completions client.
pub struct PerplexityClient {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl PerplexityClient {
    /// A blank key counts as no key.
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

impl fmt::Debug for PerplexityClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerplexityClient")
            .field("has_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl GenerateText for PerplexityClient {
    #[instrument(level = "info", skip_all)]
    async fn complete(&self, prompt: &str) -> Result<String, ItineraryError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ItineraryError::MissingCredentials)?;

        let request = ChatRequest {
            model: PERPLEXITY_MODEL,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.7,
            max_tokens: 1000,
        };

        let response = self
            .client
            .post(PERPLEXITY_URL)
            .bearer_auth(api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %truncate_for_log(&body, 300), "Itinerary model rejected request");
            return Err(ItineraryError::HttpError(status.as_u16()));
        }

        let body = response.text().await.map_err(map_reqwest_error)?;
        parse_completion(&body)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ItineraryError {
    if e.is_timeout() {
        ItineraryError::Timeout
    } else {
        ItineraryError::Network(e.to_string())
    }
}

/// Pull `choices[0].message.content` out of a chat-completions body.
fn parse_completion(body: &str) -> Result<String, ItineraryError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ItineraryError::MalformedResponse(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| ItineraryError::MalformedResponse("no choices".to_string()))
}

/// The prompt sent for `address`.
pub fn build_prompt(address: &str) -> String {
    format!(
        "다음 주소를 기준으로 2~3시간짜리 여행 코스 3가지를 제안해주세요. \
각 코스에는 도보나 짧은 대중교통으로 이어지는 실제 장소 2~3곳을 넣어주세요.\n\n\
주소: {address}\n\n\
# 페르소나\n\
당신은 이 동네에서 오래 산 주민입니다. 광고성 정보가 아니라 직접 다녀 본 사람의 \
솔직한 추천을 친근한 말투로 들려주세요.\n\n\
# 형식\n\
- '코스 1: [코스 제목]', '코스 2: [코스 제목]', '코스 3: [코스 제목]'\n\
- 각 장소마다 추천 이유를 한 줄로, 이동 팁이나 소요 시간을 곁들여서\n\
- 전체 300자 이내로 간결하게\n\n\
# 제약\n\
- 현재 운영 중인 실제 가게, 카페, 공원 이름만 사용하세요.\n\
- 주소는 음식점일 가능성이 높으니 디저트, 카페, 산책 장소 위주로 이어주세요.\n\
- 관광객으로 붐비는 곳보다는 주민들이 아끼는 곳을 골라주세요.\n"
    )
}

/// A generated itinerary in both languages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Itinerary {
    pub source: String,
    pub translated: String,
}

/// Generates, translates, and attaches itineraries.
#[derive(Debug)]
pub struct ItineraryEnricher<G> {
    generator: G,
}

impl<G: GenerateText> ItineraryEnricher<G> {
    /// An enricher asking `generator` for suggestions.
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    /// Ask the model for courses around `address`.
    ///
    /// The address is not validated; an unusable label such as `None` still
    /// produces a request.
    ///
    /// # Arguments
    ///
    /// * `address` - Store and address label used in the prompt
    ///
    /// # Returns
    ///
    /// The model's answer as returned, in Korean.
    ///
    /// # Errors
    ///
    /// Any [`ItineraryError`] from the generator, or
    /// [`ItineraryError::MalformedResponse`] when the answer is blank.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let enricher = ItineraryEnricher::new(PerplexityClient::new(client, Some(key)));
    /// let course = enricher.suggest("연남토마, 서울 마포구 동교로 262").await?;
    /// ```
    #[instrument(level = "info", skip(self))]
    pub async fn suggest(&self, address: &str) -> Result<String, ItineraryError> {
        let text = self.generator.complete(&build_prompt(address)).await?;
        if text.trim().is_empty() {
            return Err(ItineraryError::MalformedResponse("empty content".to_string()));
        }
        info!(chars = text.chars().count(), "Received itinerary");
        Ok(text)
    }

    /// Suggest, translate, and append the itinerary section to `document`.
    pub async fn enrich<T: Translate>(
        &self,
        document: &mut BilingualDocument,
        address: &str,
        translator: &Translator<T>,
    ) -> Result<Itinerary, ItineraryError> {
        let source = self.suggest(address).await?;
        let translated = translator.translate(&source).await;

        document.push_text(HEADING_KO, HEADING_EN);
        document.push_text(source.clone(), translated.clone());
        Ok(Itinerary { source, translated })
    }
}
