//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 파서가 만드는 [`ChatEvent`], 분류기가 내리는 [`ClassificationOutcome`],
//! 디스패처가 전송하는 [`Notification`]을 정의합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 채팅 채널
///
/// 로그 라인에 들어 있는 채널 이름을 소문자로 정규화하여 보관합니다.
/// 분류기가 특별하게 다루는 네 개의 채널 외에는 [`Channel::Other`]입니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Channel {
    /// "общий" -- 항상 무시
    General,
    /// "глобальный"
    Global,
    /// "торговый"
    Trade,
    /// "локальный"
    Local,
    /// 그 밖의 채널 (소문자)
    Other(String),
}

impl Channel {
    /// 일반 채널 이름
    pub const GENERAL: &'static str = "общий";
    /// 글로벌 채널 이름
    pub const GLOBAL: &'static str = "глобальный";
    /// 거래 채널 이름
    pub const TRADE: &'static str = "торговый";
    /// 로컬 채널 이름
    pub const LOCAL: &'static str = "локальный";

    /// 채널 이름을 대소문자 구분 없이 해석합니다.
    pub fn from_name(name: &str) -> Self {
        let lower = name.trim().to_lowercase();
        match lower.as_str() {
            Self::GENERAL => Self::General,
            Self::GLOBAL => Self::Global,
            Self::TRADE => Self::Trade,
            Self::LOCAL => Self::Local,
            _ => Self::Other(lower),
        }
    }

    /// 소문자 채널 이름을 반환합니다.
    pub fn as_str(&self) -> &str {
        match self {
            Self::General => Self::GENERAL,
            Self::Global => Self::GLOBAL,
            Self::Trade => Self::TRADE,
            Self::Local => Self::LOCAL,
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Channel {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.as_str().to_owned()
    }
}

/// 채팅 이벤트
///
/// 로그 라인 하나에서 파싱된 채팅 메시지입니다.
/// 분류가 끝나면 버려지며 저장되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// 채널
    pub channel: Channel,
    /// 플레이어 이름
    pub player: String,
    /// 메시지 본문
    pub text: String,
}

impl ChatEvent {
    /// 새 이벤트를 생성합니다.
    ///
    /// 채널 또는 플레이어 이름이 비어 있으면 `None`을 반환합니다.
    pub fn new(channel: &str, player: impl Into<String>, text: impl Into<String>) -> Option<Self> {
        let player = player.into();
        if channel.trim().is_empty() || player.trim().is_empty() {
            return None;
        }
        Some(Self {
            channel: Channel::from_name(channel),
            player,
            text: text.into(),
        })
    }

    /// 소문자로 변환한 메시지 본문
    pub fn lowercase_text(&self) -> String {
        self.text.to_lowercase()
    }
}

impl fmt::Display for ChatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}: {}", self.channel, self.player, self.text)
    }
}

/// 분류 결과
///
/// 이벤트마다 정확히 하나의 결과가 나옵니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationOutcome {
    /// 검사 대상 아님
    Ignored,
    /// 화이트리스트 문구 포함
    Whitelisted,
    /// 알림 키워드 포함 (낮은 심각도)
    AlertMatch(String),
    /// 위반 키워드 포함
    KeywordViolation(String),
    /// 모델이 위반으로 판정 (판정 원문)
    ModelViolation(String),
    /// 모델이 위반 없음으로 판정했거나 모델 호출 실패
    ModelClean,
}

impl ClassificationOutcome {
    /// 메트릭 레이블로 쓰는 이름
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Whitelisted => "whitelisted",
            Self::AlertMatch(_) => "alert",
            Self::KeywordViolation(_) => "keyword_violation",
            Self::ModelViolation(_) => "model_violation",
            Self::ModelClean => "model_clean",
        }
    }

    /// 알림 전송 대상인지 여부
    pub fn is_flagged(&self) -> bool {
        matches!(
            self,
            Self::AlertMatch(_) | Self::KeywordViolation(_) | Self::ModelViolation(_)
        )
    }
}

impl fmt::Display for ClassificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlertMatch(kw) | Self::KeywordViolation(kw) => {
                write!(f, "{}({kw})", self.label())
            }
            Self::ModelViolation(verdict) => write!(f, "{}({verdict})", self.label()),
            _ => f.write_str(self.label()),
        }
    }
}

/// 알림 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    /// 가벼운 주의 알림
    HeadsUp,
    /// 규칙 위반 알림
    Violation,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeadsUp => write!(f, "heads_up"),
            Self::Violation => write!(f, "violation"),
        }
    }
}

/// 알림 페이로드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// 알림 종류
    pub kind: NotificationKind,
    /// 채널 (소문자)
    pub channel: String,
    /// 플레이어 이름
    pub player: String,
    /// 원본 메시지
    pub text: String,
    /// 사유 (매칭 키워드 또는 모델 판정)
    pub reason: String,
}

impl Notification {
    /// 전송할 메시지 문자열을 만듭니다.
    pub fn render(&self) -> String {
        match self.kind {
            NotificationKind::HeadsUp => {
                format!("({}) {}: {}", self.channel, self.player, self.text)
            }
            NotificationKind::Violation => format!(
                "Нарушение: {} ({}) {}: {}",
                self.reason, self.channel, self.player, self.text
            ),
        }
    }
}
