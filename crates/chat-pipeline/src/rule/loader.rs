//! 규칙 파일 로더 -- 키워드 목록과 프롬프트를 디스크에서 로드합니다.
//!
//! 목록 파일은 한 줄에 항목 하나인 UTF-8 텍스트입니다.
//! 로그 파일의 레거시 인코딩과는 별개로 항상 UTF-8로 읽습니다.
//!
//! 읽기 실패는 에러 로그를 남기고 빈 결과로 대체합니다.
//! 규칙 파일 하나가 없어도 데몬은 줄어든 규칙으로 계속 동작합니다.

use std::path::Path;

use chatguard_core::config::RulesConfig;

use super::{Prompts, RuleSet, RuleSets};
use crate::error::ChatPipelineError;

/// 규칙 파일 최대 크기
const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// 규칙 파일 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 설정에 지정된 모든 목록을 로드합니다.
    pub async fn load_rule_sets(config: &RulesConfig) -> RuleSets {
        RuleSets {
            whitelist: Self::load_list(&config.whitelist).await,
            alert: Self::load_list(&config.alert_keywords).await,
            violation: Self::load_list(&config.violation_keywords).await,
            trade: Self::load_list(&config.trade_phrases).await,
        }
    }

    /// 설정에 지정된 모든 프롬프트를 로드합니다.
    pub async fn load_prompts(config: &RulesConfig) -> Prompts {
        Prompts {
            global: Self::load_prompt(&config.global_prompt).await,
            trade: Self::load_prompt(&config.trade_prompt).await,
            default: Self::load_prompt(&config.default_prompt).await,
        }
    }

    /// 목록 파일을 로드합니다. 실패 시 빈 목록을 반환합니다.
    pub async fn load_list(path: impl AsRef<Path>) -> RuleSet {
        let path = path.as_ref();
        match Self::try_load_list(path).await {
            Ok(set) => {
                tracing::info!(path = %path.display(), entries = set.len(), "loaded rule list");
                set
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load rule list, continuing with empty list");
                RuleSet::empty()
            }
        }
    }

    /// 프롬프트 파일을 로드합니다. 실패 시 빈 문자열을 반환합니다.
    pub async fn load_prompt(path: impl AsRef<Path>) -> String {
        let path = path.as_ref();
        match Self::read_text(path).await {
            Ok(text) => text.trim().to_owned(),
            Err(e) => {
                tracing::error!(error = %e, "failed to load prompt, continuing with empty prompt");
                String::new()
            }
        }
    }

    /// 목록 파일을 로드합니다.
    ///
    /// # Errors
    /// - 파일을 읽을 수 없거나 UTF-8이 아닌 경우
    /// - 파일 크기가 `MAX_RULE_FILE_SIZE`를 초과하는 경우
    pub async fn try_load_list(path: &Path) -> Result<RuleSet, ChatPipelineError> {
        let content = Self::read_text(path).await?;
        Ok(RuleSet::new(content.lines()))
    }

    async fn read_text(path: &Path) -> Result<String, ChatPipelineError> {
        let load_err = |reason: String| ChatPipelineError::RuleLoad {
            path: path.display().to_string(),
            reason,
        };

        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| load_err(e.to_string()))?;
        if meta.len() > MAX_RULE_FILE_SIZE {
            return Err(load_err(format!(
                "file too large: {} bytes (max {MAX_RULE_FILE_SIZE})",
                meta.len()
            )));
        }

        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| load_err(e.to_string()))
    }
}
