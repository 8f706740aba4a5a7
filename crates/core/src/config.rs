//! 설정 관리 -- chatguard.toml 파싱 및 런타임 설정
//!
//! [`ChatguardConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`CHATGUARD_MODERATION_API_TOKEN=...` 형식)
//! 3. 설정 파일 (`chatguard.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), chatguard_core::error::ChatguardError> {
//! use chatguard_core::config::ChatguardConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = ChatguardConfig::load("chatguard.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = ChatguardConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ChatguardError, ConfigError};

/// chatguard 통합 설정
///
/// `chatguard.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatguardConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 감시할 게임 로그 목록
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    /// 규칙/프롬프트 파일 경로
    #[serde(default)]
    pub rules: RulesConfig,
    /// 외부 모더레이션 모델 설정
    #[serde(default)]
    pub moderation: ModerationConfig,
    /// 알림 전송 설정
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// 이벤트 파이프라인 튜닝
    #[serde(default)]
    pub pipeline: ChatPipelineConfig,
    /// 처벌 기록 저장소
    #[serde(default)]
    pub punishment: PunishmentConfig,
    /// Prometheus 메트릭
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl ChatguardConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ChatguardError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드, 검증 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ChatguardError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ChatguardError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                ChatguardError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, ChatguardError> {
        toml::from_str(toml_str).map_err(|e| {
            ChatguardError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `CHATGUARD_{SECTION}_{FIELD}`
    /// 예: `CHATGUARD_NOTIFIER_BOT_TOKEN=123:abc`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "CHATGUARD_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "CHATGUARD_GENERAL_LOG_FORMAT");

        // Rules
        override_string(&mut self.rules.whitelist, "CHATGUARD_RULES_WHITELIST");
        override_string(
            &mut self.rules.alert_keywords,
            "CHATGUARD_RULES_ALERT_KEYWORDS",
        );
        override_string(
            &mut self.rules.violation_keywords,
            "CHATGUARD_RULES_VIOLATION_KEYWORDS",
        );
        override_string(&mut self.rules.trade_phrases, "CHATGUARD_RULES_TRADE_PHRASES");

        // Moderation
        override_bool(&mut self.moderation.enabled, "CHATGUARD_MODERATION_ENABLED");
        override_string(&mut self.moderation.api_url, "CHATGUARD_MODERATION_API_URL");
        override_string(
            &mut self.moderation.api_token,
            "CHATGUARD_MODERATION_API_TOKEN",
        );
        override_string(&mut self.moderation.model, "CHATGUARD_MODERATION_MODEL");
        override_u64(
            &mut self.moderation.timeout_secs,
            "CHATGUARD_MODERATION_TIMEOUT_SECS",
        );
        override_f64(
            &mut self.moderation.temperature,
            "CHATGUARD_MODERATION_TEMPERATURE",
        );
        override_csv(&mut self.moderation.channels, "CHATGUARD_MODERATION_CHANNELS");

        // Notifier
        override_bool(&mut self.notifier.enabled, "CHATGUARD_NOTIFIER_ENABLED");
        override_string(&mut self.notifier.api_base, "CHATGUARD_NOTIFIER_API_BASE");
        override_string(&mut self.notifier.bot_token, "CHATGUARD_NOTIFIER_BOT_TOKEN");
        override_string(&mut self.notifier.chat_id, "CHATGUARD_NOTIFIER_CHAT_ID");
        override_u64(
            &mut self.notifier.timeout_secs,
            "CHATGUARD_NOTIFIER_TIMEOUT_SECS",
        );

        // Pipeline
        override_u64(
            &mut self.pipeline.poll_interval_ms,
            "CHATGUARD_PIPELINE_POLL_INTERVAL_MS",
        );
        override_usize(
            &mut self.pipeline.max_in_flight_events,
            "CHATGUARD_PIPELINE_MAX_IN_FLIGHT_EVENTS",
        );
        override_usize(
            &mut self.pipeline.context_capacity,
            "CHATGUARD_PIPELINE_CONTEXT_CAPACITY",
        );

        // Punishment
        override_string(
            &mut self.punishment.store_path,
            "CHATGUARD_PUNISHMENT_STORE_PATH",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "CHATGUARD_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "CHATGUARD_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "CHATGUARD_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ChatguardError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        // sources 검증
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(invalid("sources.name", "must not be empty".to_owned()));
            }
            if source.path.trim().is_empty() {
                return Err(invalid(
                    "sources.path",
                    format!("source '{}' has an empty path", source.name),
                ));
            }
            if source.encoding.trim().is_empty() {
                return Err(invalid(
                    "sources.encoding",
                    format!("source '{}' has an empty encoding label", source.name),
                ));
            }
            if !seen.insert(source.name.as_str()) {
                return Err(invalid(
                    "sources.name",
                    format!("duplicate source name '{}'", source.name),
                ));
            }
        }

        // moderation 검증
        if self.moderation.enabled {
            if self.moderation.api_url.trim().is_empty() {
                return Err(invalid(
                    "moderation.api_url",
                    "must not be empty when moderation is enabled".to_owned(),
                ));
            }
            if self.moderation.model.trim().is_empty() {
                return Err(invalid(
                    "moderation.model",
                    "must not be empty when moderation is enabled".to_owned(),
                ));
            }
        }
        if self.moderation.timeout_secs == 0 {
            return Err(invalid(
                "moderation.timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }
        if !(0.4..=0.7).contains(&self.moderation.temperature) {
            return Err(invalid(
                "moderation.temperature",
                "must be within 0.4-0.7".to_owned(),
            ));
        }
        if self.moderation.max_tokens == 0 {
            return Err(invalid(
                "moderation.max_tokens",
                "must be greater than 0".to_owned(),
            ));
        }

        // notifier 검증
        if self.notifier.enabled {
            if self.notifier.bot_token.trim().is_empty() {
                return Err(invalid(
                    "notifier.bot_token",
                    "must not be empty when notifier is enabled".to_owned(),
                ));
            }
            if self.notifier.chat_id.trim().is_empty() {
                return Err(invalid(
                    "notifier.chat_id",
                    "must not be empty when notifier is enabled".to_owned(),
                ));
            }
        }
        if self.notifier.timeout_secs == 0 {
            return Err(invalid(
                "notifier.timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        // pipeline 검증
        const MAX_POLL_INTERVAL_MS: u64 = 60_000;
        if self.pipeline.poll_interval_ms == 0
            || self.pipeline.poll_interval_ms > MAX_POLL_INTERVAL_MS
        {
            return Err(invalid(
                "pipeline.poll_interval_ms",
                format!("must be 1-{MAX_POLL_INTERVAL_MS}"),
            ));
        }
        for (field, value) in [
            ("pipeline.max_line_length", self.pipeline.max_line_length),
            (
                "pipeline.line_channel_capacity",
                self.pipeline.line_channel_capacity,
            ),
            (
                "pipeline.max_in_flight_events",
                self.pipeline.max_in_flight_events,
            ),
            ("pipeline.context_capacity", self.pipeline.context_capacity),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0".to_owned()));
            }
        }

        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(invalid(
                "metrics.endpoint",
                "only '/metrics' is supported".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> ChatguardError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 감시할 게임 클라이언트 로그
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// 소스 이름 (예: "HiTech", "Mobile")
    pub name: String,
    /// 로그 파일 경로
    pub path: String,
    /// 로그 파일 인코딩 (WHATWG 레이블)
    #[serde(default = "default_source_encoding")]
    pub encoding: String,
}

fn default_source_encoding() -> String {
    "windows-1251".to_owned()
}

impl SourceConfig {
    /// 기본 인코딩으로 소스 설정을 만듭니다.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            encoding: default_source_encoding(),
        }
    }
}

/// 규칙/프롬프트 파일 경로
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// 화이트리스트 문구
    pub whitelist: String,
    /// 알림 키워드
    pub alert_keywords: String,
    /// 위반 키워드
    pub violation_keywords: String,
    /// 거래 채팅 문구
    pub trade_phrases: String,
    /// 글로벌 채널 프롬프트
    pub global_prompt: String,
    /// 거래 채널 프롬프트
    pub trade_prompt: String,
    /// 그 밖의 채널 프롬프트
    pub default_prompt: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            whitelist: "texts/whitelist.txt".to_owned(),
            alert_keywords: "texts/notification_keywords.txt".to_owned(),
            violation_keywords: "texts/banned_words.txt".to_owned(),
            trade_phrases: "texts/trade_chat.txt".to_owned(),
            global_prompt: "texts/prompt_global.txt".to_owned(),
            trade_prompt: "texts/prompt_trade.txt".to_owned(),
            default_prompt: "texts/default_prompt.txt".to_owned(),
        }
    }
}

/// 외부 모더레이션 모델 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// 모델 검사 활성화 여부
    pub enabled: bool,
    /// chat completions 엔드포인트 URL
    pub api_url: String,
    /// Bearer 토큰
    pub api_token: String,
    /// 모델 식별자
    pub model: String,
    /// 호출 타임아웃 (초)
    pub timeout_secs: u64,
    /// 샘플링 temperature (0.4-0.7)
    pub temperature: f64,
    /// repetition penalty
    pub repetition_penalty: f64,
    /// top-p
    pub top_p: f64,
    /// top-k
    pub top_k: u32,
    /// 최대 생성 토큰 수
    pub max_tokens: u32,
    /// 모델 검사를 받는 채널 (소문자 이름)
    pub channels: Vec<String>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: String::new(),
            api_token: String::new(),
            model: "Meta-Llama-3.1-8B-Instruct".to_owned(),
            timeout_secs: 30,
            temperature: 0.4,
            repetition_penalty: 1.1,
            top_p: 0.9,
            top_k: 40,
            max_tokens: 1024,
            channels: vec!["глобальный".to_owned(), "торговый".to_owned()],
        }
    }
}

/// 알림 전송 설정 (Telegram Bot API)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// 활성화 여부. 비활성화 시 알림은 로그로만 남습니다.
    pub enabled: bool,
    /// Bot API 베이스 URL
    pub api_base: String,
    /// 봇 토큰
    pub bot_token: String,
    /// 대상 채팅 ID
    pub chat_id: String,
    /// 알림 한 건의 전송 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: "https://api.telegram.org".to_owned(),
            bot_token: String::new(),
            chat_id: String::new(),
            timeout_secs: 10,
        }
    }
}

/// 이벤트 파이프라인 튜닝
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatPipelineConfig {
    /// 새 데이터가 없을 때 대기 간격 (밀리초)
    pub poll_interval_ms: u64,
    /// 최대 라인 길이 (바이트)
    pub max_line_length: usize,
    /// 수집기 → 파서 채널 용량
    pub line_channel_capacity: usize,
    /// 동시에 분류 중인 이벤트 최대 수 (소스별)
    pub max_in_flight_events: usize,
    /// 플레이어별 최근 메시지 보관 수
    pub context_capacity: usize,
}

impl Default for ChatPipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            max_line_length: 64 * 1024, // 64KB
            line_channel_capacity: 1024,
            max_in_flight_events: 256,
            context_capacity: 10,
        }
    }
}

/// 처벌 기록 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PunishmentConfig {
    /// JSON 파일 경로
    pub store_path: String,
}

impl Default for PunishmentConfig {
    fn default() -> Self {
        Self {
            store_path: "punishments.json".to_owned(),
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_f64(target: &mut f64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<f64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse f64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
