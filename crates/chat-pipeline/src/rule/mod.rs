//! 규칙 모듈 -- 키워드/문구 목록과 모델 프롬프트
//!
//! # 구성
//! - [`RuleSet`]: 소문자 부분 문자열 목록. 대소문자 구분 없는 포함 검사.
//! - [`RuleSets`]: 분류기가 사용하는 네 가지 목록 묶음
//! - [`Prompts`]: 채널별 모델 프롬프트
//! - [`RuleLoader`]: 디스크에서 목록/프롬프트를 로드
//!
//! 모든 값은 시작 시 한 번 로드되며 이후 변경되지 않습니다.

pub mod loader;

pub use loader::RuleLoader;

use chatguard_core::types::Channel;

/// 소문자 부분 문자열 집합
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    entries: Vec<String>,
}

impl RuleSet {
    /// 항목 목록으로 규칙 집합을 만듭니다.
    ///
    /// 항목은 trim 후 소문자로 정규화되며, 빈 항목은 버려집니다.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { entries }
    }

    /// 빈 규칙 집합
    pub fn empty() -> Self {
        Self::default()
    }

    /// 소문자 텍스트에 포함된 첫 번째 항목을 찾습니다.
    pub fn find_match(&self, lowercase_text: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| lowercase_text.contains(entry.as_str()))
            .map(String::as_str)
    }

    /// 소문자 텍스트에 포함된 항목이 있는지 확인합니다.
    pub fn matches(&self, lowercase_text: &str) -> bool {
        self.find_match(lowercase_text).is_some()
    }

    /// 항목 수
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 분류기가 사용하는 규칙 묶음
#[derive(Debug, Clone, Default)]
pub struct RuleSets {
    /// 화이트리스트 문구
    pub whitelist: RuleSet,
    /// 알림 키워드
    pub alert: RuleSet,
    /// 위반 키워드
    pub violation: RuleSet,
    /// 거래 채팅 문구
    pub trade: RuleSet,
}

/// 채널별 모델 프롬프트
#[derive(Debug, Clone, Default)]
pub struct Prompts {
    /// 글로벌 채널
    pub global: String,
    /// 거래 채널
    pub trade: String,
    /// 그 밖의 채널
    pub default: String,
}

impl Prompts {
    /// 채널에 맞는 프롬프트를 선택합니다.
    pub fn for_channel(&self, channel: &Channel) -> &str {
        match channel {
            Channel::Global => &self.global,
            Channel::Trade => &self.trade,
            _ => &self.default,
        }
    }
}
