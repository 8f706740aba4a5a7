//! 채팅 파이프라인 에러 타입
//!
//! [`ChatPipelineError`]는 채팅 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<ChatPipelineError> for ChatguardError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! 대부분의 에러는 파이프라인을 멈추지 않습니다. 모델 호출 실패는 게이트 안에서
//! [`ModelVerdict::Unavailable`](crate::moderation::ModelVerdict)로 바뀌고,
//! 알림 실패는 디스패처가 로그로 남긴 뒤 버립니다.

use chatguard_core::error::{ChatguardError, PipelineError};

/// 채팅 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ChatPipelineError {
    /// 감시 시작 시점에 로그 파일이 없거나 열 수 없음
    #[error("source unavailable: {source_name}: {path}: {reason}")]
    SourceUnavailable {
        /// 소스 이름
        source_name: String,
        /// 로그 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 감시 도중 발생한 읽기 에러
    #[error("source io error: {source_name}: {reason}")]
    SourceIo {
        /// 소스 이름
        source_name: String,
        /// 실패 사유
        reason: String,
    },

    /// 규칙/프롬프트 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 모델 API 전송 실패
    #[error("model transport error: {0}")]
    ModelTransport(String),

    /// 모델 API가 200이 아닌 상태 코드를 반환
    #[error("model returned status {status}: {body}")]
    ModelStatus {
        /// HTTP 상태 코드
        status: u16,
        /// 응답 본문
        body: String,
    },

    /// 모델 호출 타임아웃
    #[error("model call timed out after {timeout_secs}s")]
    ModelTimeout {
        /// 타임아웃 (초)
        timeout_secs: u64,
    },

    /// 모델 응답 본문 해석 실패
    #[error("model response error: {0}")]
    ModelResponse(String),

    /// 알림 전송 실패
    #[error("notify error: {0}")]
    Notify(String),

    /// 처벌 기록 저장소 에러
    #[error("punishment store error: {path}: {reason}")]
    PunishmentStore {
        /// 저장소 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// JSON 직렬화/역직렬화 에러
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ChatPipelineError> for ChatguardError {
    fn from(err: ChatPipelineError) -> Self {
        match err {
            ChatPipelineError::SourceUnavailable {
                source_name,
                reason,
                ..
            } => ChatguardError::Pipeline(PipelineError::SourceUnavailable {
                source_name,
                reason,
            }),
            ChatPipelineError::Io(e) => ChatguardError::Io(e),
            other => ChatguardError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
