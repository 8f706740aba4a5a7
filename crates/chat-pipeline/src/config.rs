//! 채팅 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`SourceConfig`]와 [`ChatPipelineConfig`]를
//! 합쳐 소스 하나를 감시하는 파이프라인 전용 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use chatguard_core::config::ChatguardConfig;
//! use chatguard_pipeline::config::PipelineConfig;
//!
//! let core_config = ChatguardConfig::default();
//! for source in &core_config.sources {
//!     let config = PipelineConfig::from_core(source, &core_config.pipeline);
//! }
//! ```

use std::time::Duration;

use chatguard_core::config::{ChatPipelineConfig, SourceConfig};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::error::ChatPipelineError;

/// 소스 하나에 대한 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 소스 이름 (로그와 메트릭 레이블에 사용)
    pub source_name: String,
    /// 감시할 로그 파일 경로
    pub path: String,
    /// 로그 파일 인코딩 (WHATWG 레이블)
    pub encoding: String,
    /// 새 데이터가 없을 때 대기 간격 (밀리초)
    pub poll_interval_ms: u64,
    /// 최대 라인 길이 (바이트)
    pub max_line_length: usize,
    /// 수집기 → 처리 루프 채널 용량
    pub line_channel_capacity: usize,
    /// 동시에 분류 중인 이벤트 최대 수
    pub max_in_flight_events: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let core = ChatPipelineConfig::default();
        Self {
            source_name: "default".to_owned(),
            path: "logs/fml-client-latest.log".to_owned(),
            encoding: "windows-1251".to_owned(),
            poll_interval_ms: core.poll_interval_ms,
            max_line_length: core.max_line_length,
            line_channel_capacity: core.line_channel_capacity,
            max_in_flight_events: core.max_in_flight_events,
        }
    }
}

impl PipelineConfig {
    /// core 설정에서 소스별 파이프라인 설정을 생성합니다.
    pub fn from_core(source: &SourceConfig, pipeline: &ChatPipelineConfig) -> Self {
        Self {
            source_name: source.name.clone(),
            path: source.path.clone(),
            encoding: source.encoding.clone(),
            poll_interval_ms: pipeline.poll_interval_ms,
            max_line_length: pipeline.max_line_length,
            line_channel_capacity: pipeline.line_channel_capacity,
            max_in_flight_events: pipeline.max_in_flight_events,
        }
    }

    /// 폴링 간격
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// 인코딩 레이블을 `encoding_rs` 인코딩으로 해석합니다.
    pub fn resolve_encoding(&self) -> Result<&'static Encoding, ChatPipelineError> {
        Encoding::for_label(self.encoding.trim().as_bytes()).ok_or_else(|| {
            ChatPipelineError::Config {
                field: "encoding".to_owned(),
                reason: format!("unknown encoding label '{}'", self.encoding),
            }
        })
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ChatPipelineError> {
        const MAX_POLL_INTERVAL_MS: u64 = 60_000;
        const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

        if self.source_name.trim().is_empty() {
            return Err(ChatPipelineError::Config {
                field: "source_name".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.path.trim().is_empty() {
            return Err(ChatPipelineError::Config {
                field: "path".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        self.resolve_encoding()?;

        if self.poll_interval_ms == 0 || self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(ChatPipelineError::Config {
                field: "poll_interval_ms".to_owned(),
                reason: format!("must be 1-{MAX_POLL_INTERVAL_MS}"),
            });
        }

        if self.max_line_length == 0 || self.max_line_length > MAX_LINE_LENGTH {
            return Err(ChatPipelineError::Config {
                field: "max_line_length".to_owned(),
                reason: format!("must be 1-{MAX_LINE_LENGTH}"),
            });
        }

        if self.line_channel_capacity == 0 {
            return Err(ChatPipelineError::Config {
                field: "line_channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.max_in_flight_events == 0 {
            return Err(ChatPipelineError::Config {
                field: "max_in_flight_events".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        Ok(())
    }
}

/// 파이프라인 설정 빌더
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 소스 이름을 설정합니다.
    pub fn source_name(mut self, name: impl Into<String>) -> Self {
        self.config.source_name = name.into();
        self
    }

    /// 로그 파일 경로를 설정합니다.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    /// 인코딩 레이블을 설정합니다.
    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.config.encoding = encoding.into();
        self
    }

    /// 폴링 간격(밀리초)을 설정합니다.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// 최대 라인 길이를 설정합니다.
    pub fn max_line_length(mut self, len: usize) -> Self {
        self.config.max_line_length = len;
        self
    }

    /// 동시 처리 이벤트 상한을 설정합니다.
    pub fn max_in_flight_events(mut self, max: usize) -> Self {
        self.config.max_in_flight_events = max;
        self
    }

    /// 설정을 검증하고 `PipelineConfig`를 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, ChatPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
