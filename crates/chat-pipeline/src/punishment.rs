//! 처벌 기록
//!
//! 게임 서버는 뮤트가 적용되면 일반 채널에 `System` 이름으로 공지를 남깁니다.
//!
//! ```text
//! [12:00:00] [INFO] [Client thread/]: [Общий] System -> §0[§6Наказание§0] §b§2Alice §cбыл замучен§3 Moder §cна §e30 минут §cпо причине: §72.1
//! ```
//!
//! [`PunishmentNoticeParser`]가 이 공지를 알아보면 파이프라인은 플레이어의
//! 최근 메시지를 붙여 [`PunishmentStore`]에 기록합니다.
//! 저장소는 플레이어 이름을 키로 하는 JSON 객체이며, 같은 플레이어의
//! 새 기록은 이전 기록을 덮어씁니다.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use chatguard_core::types::{Channel, ChatEvent};

use crate::context::PlayerContextStore;
use crate::error::ChatPipelineError;

/// 서버 공지를 남기는 플레이어 이름
pub const SYSTEM_PLAYER: &str = "System";

const NOTICE_PATTERN: &str =
    r"^§b§2(.+?) §cбыл замучен§3 (.+?) §cна §e(.+?) §cпо причине: §7(.*)$";

/// 처벌 기록
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunishmentRecord {
    /// 처벌받은 플레이어
    pub player: String,
    /// 처벌한 모더레이터
    pub moderator: String,
    /// 사유 코드
    pub reason_code: String,
    /// 기간
    pub duration: String,
    /// 처벌 직전 플레이어의 최근 메시지
    pub context: Vec<String>,
}

impl PunishmentRecord {
    /// 컨텍스트 저장소에서 플레이어의 최근 메시지를 붙여 기록을 만듭니다.
    pub fn with_context(
        player: impl Into<String>,
        moderator: impl Into<String>,
        reason_code: impl Into<String>,
        duration: impl Into<String>,
        context: &PlayerContextStore,
    ) -> Self {
        let player = player.into();
        let window = context.snapshot(&player).unwrap_or_else(|| {
            tracing::warn!(player = %player, "no context recorded for player");
            Vec::new()
        });
        Self {
            moderator: moderator.into(),
            reason_code: reason_code.into(),
            duration: duration.into(),
            context: window,
            player,
        }
    }
}

/// 서버의 처벌 공지
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunishmentNotice {
    /// 처벌받은 플레이어
    pub player: String,
    /// 처벌한 모더레이터
    pub moderator: String,
    /// 기간
    pub duration: String,
    /// 사유
    pub reason: String,
}

impl PunishmentNotice {
    /// 지정한 시각으로 게임 채팅 형식의 공지 문자열을 만듭니다.
    pub fn render_at(&self, time: NaiveTime) -> String {
        format!(
            "[{}] [Общий] System -> §0[§6Наказание§0] §b§2{} §cбыл замучен§3 {} §cна §e{} §cпо причине: §7{}",
            time.format("%H:%M:%S"),
            self.player,
            self.moderator,
            self.duration,
            self.reason
        )
    }

    /// 현재 시각으로 공지 문자열을 만듭니다.
    pub fn render(&self) -> String {
        self.render_at(Local::now().time())
    }

    /// 컨텍스트를 붙여 처벌 기록으로 변환합니다.
    pub fn to_record(&self, context: &PlayerContextStore) -> PunishmentRecord {
        PunishmentRecord::with_context(
            &self.player,
            &self.moderator,
            &self.reason,
            &self.duration,
            context,
        )
    }
}

/// 처벌 공지 파서
#[derive(Debug, Clone)]
pub struct PunishmentNoticeParser {
    pattern: Regex,
}

impl PunishmentNoticeParser {
    /// 새 파서를 생성합니다.
    pub fn new() -> Result<Self, ChatPipelineError> {
        Ok(Self {
            pattern: Regex::new(NOTICE_PATTERN)?,
        })
    }

    /// 일반 채널의 `System` 메시지에서 처벌 공지를 찾습니다.
    pub fn parse(&self, event: &ChatEvent) -> Option<PunishmentNotice> {
        if event.channel != Channel::General || event.player != SYSTEM_PLAYER {
            return None;
        }
        let caps = self.pattern.captures(event.text.trim())?;
        Some(PunishmentNotice {
            player: caps.get(1)?.as_str().to_owned(),
            moderator: caps.get(2)?.as_str().to_owned(),
            duration: caps.get(3)?.as_str().to_owned(),
            reason: caps.get(4)?.as_str().to_owned(),
        })
    }
}

/// 처벌 기록 저장소 (JSON 파일)
pub struct PunishmentStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PunishmentStore {
    /// 지정한 파일을 사용하는 저장소를 만듭니다. 파일은 첫 기록 시 생성됩니다.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// 저장소 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 모든 기록을 읽습니다.
    ///
    /// 파일이 없거나 비어 있으면 경고 후 빈 맵, 손상되었으면 에러 로그 후 빈 맵입니다.
    pub async fn load(&self) -> BTreeMap<String, PunishmentRecord> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "punishment store not found, starting empty");
                return BTreeMap::new();
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "failed to read punishment store");
                return BTreeMap::new();
            }
        };

        if content.trim().is_empty() {
            tracing::warn!(path = %self.path.display(), "punishment store is empty");
            return BTreeMap::new();
        }

        match serde_json::from_str(&content) {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "punishment store is corrupt, starting empty");
                BTreeMap::new()
            }
        }
    }

    /// 기록을 저장합니다. 같은 플레이어의 이전 기록은 덮어씁니다.
    pub async fn record(&self, record: PunishmentRecord) -> Result<(), ChatPipelineError> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.load().await;
        tracing::info!(
            player = %record.player,
            moderator = %record.moderator,
            duration = %record.duration,
            context_len = record.context.len(),
            "recording punishment"
        );
        records.insert(record.player.clone(), record);

        let json = serde_json::to_string_pretty(&records)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| ChatPipelineError::PunishmentStore {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })
    }

    /// 플레이어의 기록을 찾습니다.
    pub async fn get(&self, player: &str) -> Option<PunishmentRecord> {
        self.load().await.remove(player)
    }
}
