//! HTTP 모더레이션 모델 -- OpenAI 호환 chat completions API 호출
//!
//! 요청 본문은 모델 식별자, system/user/assistant 메시지 세 개,
//! 고정 샘플링 파라미터로 구성되며 스트리밍은 사용하지 않습니다.
//! 응답에서는 첫 번째 choice의 `message.content`만 사용합니다.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use chatguard_core::config::ModerationConfig;

use super::ModerationModel;
use crate::error::ChatPipelineError;

/// 오류 응답 본문을 로그에 남길 최대 길이
const MAX_ERROR_BODY_LEN: usize = 512;

/// HTTP 모델 설정
#[derive(Debug, Clone)]
pub struct HttpModerationConfig {
    /// chat completions 엔드포인트 URL
    pub api_url: String,
    /// Bearer 토큰
    pub api_token: String,
    /// 모델 식별자
    pub model: String,
    /// temperature
    pub temperature: f64,
    /// repetition penalty
    pub repetition_penalty: f64,
    /// top-p
    pub top_p: f64,
    /// top-k
    pub top_k: u32,
    /// 최대 생성 토큰 수
    pub max_tokens: u32,
}

impl HttpModerationConfig {
    /// core 설정에서 생성합니다.
    pub fn from_core(core: &ModerationConfig) -> Self {
        Self {
            api_url: core.api_url.clone(),
            api_token: core.api_token.clone(),
            model: core.model.clone(),
            temperature: core.temperature,
            repetition_penalty: core.repetition_penalty,
            top_p: core.top_p,
            top_k: core.top_k,
            max_tokens: core.max_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 3],
    repetition_penalty: f64,
    temperature: f64,
    top_p: f64,
    top_k: u32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Default, Deserialize)]
struct Choice {
    #[serde(default)]
    message: ChoiceMessage,
}

#[derive(Debug, Default, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP 모더레이션 모델
///
/// 연결 풀을 재사용하도록 하나의 [`Client`]를 보관합니다.
pub struct HttpModerationModel {
    client: Client,
    config: HttpModerationConfig,
}

impl HttpModerationModel {
    /// 새 모델 클라이언트를 생성합니다.
    pub fn new(config: HttpModerationConfig) -> Result<Self, ChatPipelineError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ChatPipelineError::ModelTransport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn request<'a>(&'a self, system_prompt: &'a str, message: &'a str) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: message,
                },
                ChatMessage {
                    role: "assistant",
                    content: "",
                },
            ],
            repetition_penalty: self.config.repetition_penalty,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            top_k: self.config.top_k,
            max_tokens: self.config.max_tokens,
            stream: false,
        }
    }
}

impl ModerationModel for HttpModerationModel {
    async fn complete(
        &self,
        system_prompt: &str,
        message: &str,
    ) -> Result<String, ChatPipelineError> {
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_token)
            .json(&self.request(system_prompt, message))
            .send()
            .await
            .map_err(|e| ChatPipelineError::ModelTransport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChatPipelineError::ModelTransport(e.to_string()))?;

        if status != StatusCode::OK {
            return Err(ChatPipelineError::ModelStatus {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY_LEN).to_owned(),
            });
        }

        parse_completion(&body)
    }
}

/// 응답 본문에서 첫 번째 choice의 내용을 꺼냅니다.
///
/// choice나 content가 없으면 빈 문자열입니다.
fn parse_completion(body: &str) -> Result<String, ChatPipelineError> {
    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| ChatPipelineError::ModelResponse(e.to_string()))?;
    Ok(response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default())
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
