//! 채팅 라인 파서
//!
//! 게임 클라이언트 로그 라인에서 [`ChatEvent`]를 추출합니다.
//!
//! # 라인 형식
//! ```text
//! [<time>] [<level>] [<thread>/]: [<channel>] <player> -> <ignored> <message>
//! ```
//!
//! 채널이 `System`인 라인, 형식이 맞지 않는 라인은 `None`입니다.
//! 서버 상태 라인 등은 정상적으로 섞여 들어오므로 에러로 취급하지 않습니다.

use regex::Regex;

use chatguard_core::types::ChatEvent;

use crate::error::ChatPipelineError;

/// 채팅 라인 패턴 (채널, 플레이어, 메시지)
const CHAT_LINE_PATTERN: &str = r"\[\d+:\d+:\d+\] \[.+?\] \[.+?/\]: \[(.+?)\] (.+?) -> .*? (.+)";

/// 시스템 메시지 채널 토큰
const SYSTEM_CHANNEL: &str = "System";

/// 채팅 라인 파서
///
/// 컴파일된 정규식만 가지고 있으며, 복제 비용이 낮아 태스크 간 공유가 쉽습니다.
#[derive(Debug, Clone)]
pub struct ChatLineParser {
    pattern: Regex,
}

impl ChatLineParser {
    /// 새 파서를 생성합니다.
    pub fn new() -> Result<Self, ChatPipelineError> {
        Ok(Self {
            pattern: Regex::new(CHAT_LINE_PATTERN)?,
        })
    }

    /// 라인 하나를 파싱합니다.
    pub fn parse(&self, line: &str) -> Option<ChatEvent> {
        let line = line.trim_end_matches(['\r', '\n']);
        let caps = self.pattern.captures(line)?;

        let channel = caps.get(1)?.as_str();
        if channel == SYSTEM_CHANNEL {
            return None;
        }
        let player = caps.get(2)?.as_str();
        let text = caps.get(3)?.as_str();

        ChatEvent::new(channel, player, text)
    }
}
