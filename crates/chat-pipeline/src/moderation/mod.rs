//! 외부 모더레이션 모델 게이트
//!
//! [`ModerationGate`]는 외부 모델 호출을 프로세스 전체에서 한 번에 하나만
//! 실행되도록 직렬화합니다. 크기 1의 세마포어를 슬롯으로 사용하며,
//! 호출마다 고정 타임아웃을 적용합니다.
//!
//! 호출 실패(타임아웃, 전송 에러, 200이 아닌 상태)는 에러로 전파하지 않고
//! [`ModelVerdict::Unavailable`]로 바꿔 돌려줍니다. 분류기는 이를
//! "위반 없음"으로 취급합니다.
//!
//! # 구성
//! - [`ModerationModel`]: 모델 호출 trait (HTTP 구현은 [`http`] 모듈)
//! - [`ModerationGate`]: 단일 슬롯 + 타임아웃
//! - [`ModelVerdict`]: 모델 응답 또는 실패 표식

pub mod http;

pub use http::{HttpModerationConfig, HttpModerationModel};

use std::future::Future;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::sync::Semaphore;

use chatguard_core::metrics as m;

use crate::error::ChatPipelineError;

/// 모델 판정에서 위반을 뜻하는 단어 ("위반", "뮤트")
pub const VIOLATION_TRIGGERS: [&str; 2] = ["нарушение", "мут"];

/// 호출 실패 시 판정 문자열
pub const UNAVAILABLE_SENTINEL: &str = "moderation model unavailable";

/// 기본 호출 타임아웃
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(30);

/// 외부 모더레이션 모델
///
/// 시스템 프롬프트와 사용자 메시지를 받아 모델의 자유 텍스트 판정을 반환합니다.
pub trait ModerationModel: Send + Sync + 'static {
    /// 모델을 한 번 호출합니다.
    fn complete(
        &self,
        system_prompt: &str,
        message: &str,
    ) -> impl Future<Output = Result<String, ChatPipelineError>> + Send;
}

/// 모델 판정
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelVerdict {
    /// 모델이 돌려준 텍스트
    Reply(String),
    /// 타임아웃 또는 호출 실패
    Unavailable,
}

impl ModelVerdict {
    /// 판정 텍스트. 실패 시 [`UNAVAILABLE_SENTINEL`].
    pub fn as_str(&self) -> &str {
        match self {
            Self::Reply(text) => text,
            Self::Unavailable => UNAVAILABLE_SENTINEL,
        }
    }

    /// 판정 텍스트에 위반 단어가 있는지 확인합니다 (대소문자 무시).
    pub fn is_violation(&self) -> bool {
        match self {
            Self::Reply(text) => {
                let lower = text.to_lowercase();
                VIOLATION_TRIGGERS.iter().any(|t| lower.contains(t))
            }
            Self::Unavailable => false,
        }
    }
}

/// 단일 슬롯 모델 게이트
///
/// 여러 소스의 파이프라인이 `Arc`로 공유합니다.
pub struct ModerationGate<M> {
    model: M,
    slot: Semaphore,
    timeout: Duration,
}

impl<M: ModerationModel> ModerationGate<M> {
    /// 기본 타임아웃(30초)으로 게이트를 만듭니다.
    pub fn new(model: M) -> Self {
        Self::with_timeout(model, DEFAULT_MODEL_TIMEOUT)
    }

    /// 지정한 타임아웃으로 게이트를 만듭니다.
    pub fn with_timeout(model: M, timeout: Duration) -> Self {
        Self {
            model,
            slot: Semaphore::new(1),
            timeout,
        }
    }

    /// 메시지를 모델로 분류합니다.
    ///
    /// 슬롯이 비기를 기다린 뒤 호출합니다. 타임아웃은 슬롯 대기 시간을
    /// 포함하지 않고 모델 호출에만 적용됩니다.
    pub async fn classify(&self, text: &str, prompt: &str) -> ModelVerdict {
        let _permit = match self.slot.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::error!(error = %e, "moderation gate closed");
                return ModelVerdict::Unavailable;
            }
        };

        tracing::debug!(text, "sending message to moderation model");
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.model.complete(prompt, text)).await;
        histogram!(m::MODEL_CALL_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(ChatPipelineError::ModelTimeout {
                timeout_secs: self.timeout.as_secs(),
            }),
        };

        match result {
            Ok(reply) => {
                counter!(m::MODEL_CALLS_TOTAL, m::LABEL_RESULT => "success").increment(1);
                ModelVerdict::Reply(reply)
            }
            Err(e) => {
                let label = match &e {
                    ChatPipelineError::ModelTimeout { .. } => "timeout",
                    _ => "failure",
                };
                counter!(m::MODEL_CALLS_TOTAL, m::LABEL_RESULT => label).increment(1);
                tracing::error!(error = %e, "moderation model call failed");
                ModelVerdict::Unavailable
            }
        }
    }

    /// 모델 호출이 진행 중인지 여부
    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }

    /// 호출 타임아웃
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 내부 모델 참조
    pub fn model(&self) -> &M {
        &self.model
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! 테스트용 모델 구현

    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 호출 구간을 기록하는 가짜 모델
    pub struct MockModel {
        pub reply: Result<String, String>,
        pub delay: Duration,
        pub calls: AtomicUsize,
        pub windows: Mutex<Vec<(Instant, Instant)>>,
    }

    impl MockModel {
        pub fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_owned()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                windows: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(reason: &str) -> Self {
            Self {
                reply: Err(reason.to_owned()),
                ..Self::replying("")
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ModerationModel for MockModel {
        async fn complete(
            &self,
            _system_prompt: &str,
            _message: &str,
        ) -> Result<String, ChatPipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let start = Instant::now();
            tokio::time::sleep(self.delay).await;
            self.windows.lock().unwrap().push((start, Instant::now()));
            self.reply
                .clone()
                .map_err(ChatPipelineError::ModelTransport)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockModel;
    use super::*;
    use std::sync::Arc;

    #[test]
    fn verdict_trigger_words_are_case_insensitive() {
        assert!(ModelVerdict::Reply("НАРУШЕНИЕ правил 2.1".into()).is_violation());
        assert!(ModelVerdict::Reply("Выдать мут на 30 минут".into()).is_violation());
        assert!(!ModelVerdict::Reply("Всё в порядке".into()).is_violation());
    }

    #[test]
    fn unavailable_is_never_a_violation() {
        assert!(!ModelVerdict::Unavailable.is_violation());
        assert_eq!(ModelVerdict::Unavailable.as_str(), UNAVAILABLE_SENTINEL);
    }

    #[tokio::test]
    async fn reply_is_returned() {
        let gate = ModerationGate::new(MockModel::replying("нарушений нет"));
        let verdict = gate.classify("hi", "prompt").await;
        assert_eq!(verdict, ModelVerdict::Reply("нарушений нет".into()));
        assert!(!gate.is_busy());
    }

    #[tokio::test]
    async fn transport_failure_becomes_unavailable() {
        let gate = ModerationGate::new(MockModel::failing("connection refused"));
        assert_eq!(gate.classify("hi", "p").await, ModelVerdict::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_unavailable() {
        let gate = ModerationGate::with_timeout(
            MockModel::replying("нарушение").with_delay(Duration::from_secs(60)),
            Duration::from_secs(30),
        );
        let started = tokio::time::Instant::now();
        assert_eq!(gate.classify("hi", "p").await, ModelVerdict::Unavailable);
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_never_overlap() {
        let gate = Arc::new(ModerationGate::new(
            MockModel::replying("ok").with_delay(Duration::from_millis(20)),
        ));

        let mut handles = Vec::new();
        for i in 0..5 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                gate.classify(&format!("msg {i}"), "p").await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let mut windows = gate.model().windows.lock().unwrap().clone();
        assert_eq!(windows.len(), 5);
        windows.sort_by_key(|(start, _)| *start);
        for pair in windows.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "model calls overlapped");
        }
    }
}
