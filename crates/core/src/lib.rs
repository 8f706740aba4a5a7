//! chatguard-core -- 공통 타입, 설정, 에러, 파이프라인 trait
//!
//! 모든 chatguard 크레이트가 의존하는 기반 크레이트입니다.
//! 외부 I/O를 수행하지 않으며, 도메인 타입과 설정 스키마만 정의합니다.

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{ChatguardError, ConfigError, PipelineError};

// 설정
pub use config::{ChatguardConfig, SourceConfig};

// 파이프라인 trait
pub use pipeline::{HealthStatus, Pipeline};

// 도메인 타입
pub use types::{Channel, ChatEvent, ClassificationOutcome, Notification, NotificationKind};
