//! chatguard-pipeline -- 게임 채팅 모더레이션 파이프라인
//!
//! # 모듈 구성
//!
//! - [`collector`]: 게임 클라이언트 로그 파일 tail (인코딩 디코딩, 로테이션 감지)
//! - [`parser`]: 로그 라인에서 채팅 이벤트 추출
//! - [`rule`]: 키워드/문구 규칙 세트와 프롬프트 로더
//! - [`context`]: 플레이어별 최근 메시지 윈도우
//! - [`classifier`]: 단계별 분류 상태 머신
//! - [`moderation`]: 외부 모더레이션 모델과 단일 호출 게이트
//! - [`dispatch`]: 알림 디스패처와 Telegram 전송
//! - [`punishment`]: 처벌 공지 인식과 처벌 기록 저장소
//! - [`pipeline`]: 소스별 파이프라인 오케스트레이션 (Pipeline trait 구현)
//! - [`config`]: 파이프라인 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! FileCollector -> ChatLineParser -> Classifier -> Dispatcher -> Notifier
//!    cp1251          regex        |  RuleSets        |          Telegram/Log
//!                                 |  PlayerContextStore
//!                                 \- ModerationGate (최대 1개 호출) -> HTTP 모델
//! ```

pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod punishment;

pub mod collector;
pub mod dispatch;
pub mod moderation;
pub mod parser;
pub mod rule;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{ChatPipeline, ChatPipelineBuilder, PipelineStats};

// 설정
pub use config::{PipelineConfig, PipelineConfigBuilder};

// 에러
pub use error::ChatPipelineError;

// 분류
pub use classifier::{Classifier, ModelStage, NoModel, WRONG_CHANNEL_REASON};
pub use context::PlayerContextStore;
pub use parser::ChatLineParser;
pub use rule::{Prompts, RuleLoader, RuleSet, RuleSets};

// 모더레이션 모델
pub use moderation::{
    HttpModerationConfig, HttpModerationModel, ModelVerdict, ModerationGate, ModerationModel,
};

// 알림
pub use dispatch::{Dispatcher, LogNotifier, Notifier, TelegramConfig, TelegramNotifier};

// 처벌 기록
pub use punishment::{PunishmentNotice, PunishmentNoticeParser, PunishmentRecord, PunishmentStore};

// 수집기
pub use collector::{FileCollector, FileCollectorConfig, RawLine};
