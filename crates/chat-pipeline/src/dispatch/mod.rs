//! 알림 디스패처
//!
//! 분류 결과를 알림 페이로드로 바꾸고 [`Notifier`]로 전송합니다.
//!
//! | 결과 | 알림 |
//! |------|------|
//! | `AlertMatch` | heads-up |
//! | `KeywordViolation`, `ModelViolation` | violation (키워드 또는 판정을 사유로) |
//! | 그 밖 | 없음 |
//!
//! 전송 실패는 에러 로그만 남기고 버립니다. 재시도하지 않습니다.
//! 전송 한 건은 타임아웃으로 끊기므로 멈춘 전송이 이벤트 태스크를 붙잡지 않습니다.

pub mod telegram;

pub use telegram::{TelegramConfig, TelegramNotifier};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;

use chatguard_core::metrics as m;
use chatguard_core::types::{ChatEvent, ClassificationOutcome, Notification, NotificationKind};

use crate::error::ChatPipelineError;

/// 알림 전송 수단
pub trait Notifier: Send + Sync + 'static {
    /// 고정된 대상에게 텍스트 메시지 하나를 보냅니다.
    fn send(&self, text: &str) -> impl Future<Output = Result<(), ChatPipelineError>> + Send;
}

/// 알림을 로그로만 남기는 전송 수단 (알림 비활성화 시)
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<(), ChatPipelineError> {
        tracing::info!(notification = text, "notifier disabled, logging notification");
        Ok(())
    }
}

/// 분류 결과에 해당하는 알림을 만듭니다.
pub fn notification_for(
    event: &ChatEvent,
    outcome: &ClassificationOutcome,
) -> Option<Notification> {
    let (kind, reason) = match outcome {
        ClassificationOutcome::AlertMatch(keyword) => (NotificationKind::HeadsUp, keyword),
        ClassificationOutcome::KeywordViolation(keyword) => (NotificationKind::Violation, keyword),
        ClassificationOutcome::ModelViolation(verdict) => (NotificationKind::Violation, verdict),
        ClassificationOutcome::Ignored
        | ClassificationOutcome::Whitelisted
        | ClassificationOutcome::ModelClean => return None,
    };

    Some(Notification {
        kind,
        channel: event.channel.as_str().to_owned(),
        player: event.player.clone(),
        text: event.text.clone(),
        reason: reason.clone(),
    })
}

/// 기본 전송 타임아웃
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// 알림 디스패처
pub struct Dispatcher<N> {
    notifier: Arc<N>,
    timeout: Duration,
}

impl<N> Clone for Dispatcher<N> {
    fn clone(&self) -> Self {
        Self {
            notifier: Arc::clone(&self.notifier),
            timeout: self.timeout,
        }
    }
}

impl<N: Notifier> Dispatcher<N> {
    /// 기본 타임아웃으로 새 디스패처를 생성합니다.
    pub fn new(notifier: Arc<N>) -> Self {
        Self::with_timeout(notifier, DEFAULT_NOTIFY_TIMEOUT)
    }

    /// 전송 타임아웃을 지정해 새 디스패처를 생성합니다.
    pub fn with_timeout(notifier: Arc<N>, timeout: Duration) -> Self {
        Self { notifier, timeout }
    }

    /// 전송 타임아웃
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn deliver(&self, text: &str) -> Result<(), ChatPipelineError> {
        match tokio::time::timeout(self.timeout, self.notifier.send(text)).await {
            Ok(result) => result,
            Err(_) => Err(ChatPipelineError::Notify(format!(
                "send timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    /// 결과에 해당하는 알림을 전송합니다.
    ///
    /// 전송을 시도한 알림을 반환합니다. 알림 대상이 아니면 `None`입니다.
    /// 전송 실패는 로그로만 남습니다.
    pub async fn dispatch(
        &self,
        event: &ChatEvent,
        outcome: &ClassificationOutcome,
    ) -> Option<Notification> {
        let notification = notification_for(event, outcome)?;

        match self.deliver(&notification.render()).await {
            Ok(()) => {
                counter!(m::NOTIFICATIONS_TOTAL, m::LABEL_RESULT => "success").increment(1);
                tracing::debug!(
                    player = %notification.player,
                    kind = %notification.kind,
                    "notification delivered"
                );
            }
            Err(e) => {
                counter!(m::NOTIFICATIONS_TOTAL, m::LABEL_RESULT => "failure").increment(1);
                tracing::error!(
                    player = %notification.player,
                    kind = %notification.kind,
                    error = %e,
                    "failed to deliver notification"
                );
            }
        }

        Some(notification)
    }

    /// 알림 없이 텍스트를 그대로 전송합니다 (처벌 공지 등).
    pub async fn send_raw(&self, text: &str) -> Result<(), ChatPipelineError> {
        self.deliver(text).await
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! 테스트용 전송 수단

    use super::*;
    use std::sync::Mutex;

    /// 보낸 메시지를 기록하는 가짜 전송 수단
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<String>>,
        pub fail: bool,
        /// 이 문자열이 들어간 메시지는 기록한 뒤 영원히 응답하지 않습니다.
        pub hang_on: Option<String>,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn hanging_on(marker: &str) -> Self {
            Self {
                hang_on: Some(marker.to_owned()),
                ..Self::default()
            }
        }

        pub fn messages(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        async fn send(&self, text: &str) -> Result<(), ChatPipelineError> {
            self.sent.lock().unwrap().push(text.to_owned());
            if self.hang_on.as_deref().is_some_and(|m| text.contains(m)) {
                std::future::pending::<()>().await;
            }
            if self.fail {
                return Err(ChatPipelineError::Notify("transport down".to_owned()));
            }
            Ok(())
        }
    }
}
