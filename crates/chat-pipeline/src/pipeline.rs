//! 파이프라인 오케스트레이션 -- 소스 하나의 수집/파싱/분류/알림 흐름을 관리합니다.
//!
//! [`ChatPipeline`]은 core의 [`Pipeline`](chatguard_core::pipeline::Pipeline) trait을 구현하여
//! `chatguard-daemon`에서 소스마다 하나씩 같은 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! FileCollector -> mpsc -> ChatLineParser -> (이벤트마다 태스크) Classifier -> Dispatcher
//!                                                 \-> 처벌 공지 -> PunishmentStore
//! ```
//!
//! 라인은 파일 순서대로 읽고 파싱하지만, 분류는 이벤트마다 독립된 태스크에서
//! 실행되므로 알림 순서는 보장되지 않습니다. 규칙 단계에서 처리 중인 이벤트 수는
//! `max_in_flight_events`로 제한됩니다. 모델 게이트로 넘어가는 이벤트는 대기 직전에
//! 슬롯을 반납하므로, 느린 모델 호출이 알림/위반 키워드 처리를 막지 않습니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use metrics::counter;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use chatguard_core::error::ChatguardError;
use chatguard_core::metrics as m;
use chatguard_core::pipeline::{HealthStatus, Pipeline};
use chatguard_core::types::{Channel, ChatEvent};

use crate::classifier::{Classifier, NoModel};
use crate::collector::{FileCollector, FileCollectorConfig, RawLine};
use crate::config::PipelineConfig;
use crate::dispatch::{DEFAULT_NOTIFY_TIMEOUT, Dispatcher, LogNotifier, Notifier};
use crate::error::ChatPipelineError;
use crate::moderation::ModerationModel;
use crate::parser::ChatLineParser;
use crate::punishment::{
    PunishmentNotice, PunishmentNoticeParser, PunishmentStore, SYSTEM_PLAYER,
};

/// 파이프라인 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 파이프라인 처리 카운터
#[derive(Debug, Default)]
pub struct PipelineStats {
    lines_received: AtomicU64,
    events_parsed: AtomicU64,
    events_classified: AtomicU64,
    notifications: AtomicU64,
    punishments_recorded: AtomicU64,
}

impl PipelineStats {
    /// 수집기에서 받은 라인 수
    pub fn lines_received(&self) -> u64 {
        self.lines_received.load(Ordering::Relaxed)
    }

    /// 채팅 이벤트로 파싱된 라인 수
    pub fn events_parsed(&self) -> u64 {
        self.events_parsed.load(Ordering::Relaxed)
    }

    /// 분류가 끝난 이벤트 수
    pub fn events_classified(&self) -> u64 {
        self.events_classified.load(Ordering::Relaxed)
    }

    /// 전송을 시도한 알림 수
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    /// 저장한 처벌 기록 수
    pub fn punishments_recorded(&self) -> u64 {
        self.punishments_recorded.load(Ordering::Relaxed)
    }
}

/// 이벤트 하나를 처리하는 데 필요한 공유 상태
struct EventWorker<M, N> {
    source: Arc<str>,
    classifier: Classifier<M>,
    dispatcher: Dispatcher<N>,
    notices: PunishmentNoticeParser,
    punishments: Option<Arc<PunishmentStore>>,
    stats: Arc<PipelineStats>,
}

impl<M: ModerationModel, N: Notifier> EventWorker<M, N> {
    /// `permit`은 규칙 단계 동안만 잡고, 모델 게이트에 들어가기 전에 놓습니다.
    async fn handle(&self, event: ChatEvent, permit: OwnedSemaphorePermit) {
        let trace_id = Uuid::new_v4();

        let mut permit = Some(permit);
        let outcome = self
            .classifier
            .classify_with(&event, || drop(permit.take()))
            .await;
        self.stats.events_classified.fetch_add(1, Ordering::Relaxed);
        counter!(
            m::OUTCOMES_TOTAL,
            m::LABEL_SOURCE => self.source.to_string(),
            m::LABEL_OUTCOME => outcome.label()
        )
        .increment(1);

        if outcome.is_flagged() {
            tracing::info!(
                source = %self.source,
                trace_id = %trace_id,
                channel = %event.channel,
                player = %event.player,
                outcome = %outcome,
                "chat event flagged"
            );
        } else {
            tracing::info!(
                source = %self.source,
                trace_id = %trace_id,
                channel = %event.channel,
                player = %event.player,
                outcome = outcome.label(),
                "chat event classified"
            );
        }

        if self.dispatcher.dispatch(&event, &outcome).await.is_some() {
            self.stats.notifications.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(notice) = self.notices.parse(&event) {
            self.handle_notice(notice).await;
        }
    }

    async fn handle_notice(&self, notice: PunishmentNotice) {
        tracing::info!(
            source = %self.source,
            player = %notice.player,
            moderator = %notice.moderator,
            duration = %notice.duration,
            "punishment notice observed"
        );

        if let Some(store) = &self.punishments {
            let record = notice.to_record(self.classifier.context());
            match store.record(record).await {
                Ok(()) => {
                    self.stats
                        .punishments_recorded
                        .fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::error!(
                        source = %self.source,
                        player = %notice.player,
                        error = %e,
                        "failed to record punishment"
                    );
                }
            }
        }

        if let Err(e) = self.dispatcher.send_raw(&notice.render()).await {
            tracing::error!(
                source = %self.source,
                player = %notice.player,
                error = %e,
                "failed to forward punishment notice"
            );
        }
    }
}

/// 채팅 파이프라인 -- 로그 소스 하나를 감시하고 채팅 이벤트를 분류합니다.
///
/// core의 `Pipeline` trait을 구현하여 `chatguard-daemon`에서
/// 다른 소스와 동일한 생명주기(start/stop/health_check)로 관리됩니다.
/// 분류기가 가진 모델 게이트와 컨텍스트 저장소는 `Arc`이므로
/// 여러 파이프라인이 같은 인스턴스를 공유할 수 있습니다.
///
/// # 사용 예시
/// ```ignore
/// use chatguard_pipeline::{ChatPipelineBuilder, Classifier};
///
/// let mut pipeline = ChatPipelineBuilder::new()
///     .config(config)
///     .classifier(Classifier::rules_only(rules, context))
///     .build()?;
///
/// pipeline.start().await?;
/// ```
pub struct ChatPipeline<M = NoModel, N = LogNotifier> {
    config: PipelineConfig,
    state: PipelineState,
    classifier: Classifier<M>,
    dispatcher: Dispatcher<N>,
    punishments: Option<Arc<PunishmentStore>>,
    stats: Arc<PipelineStats>,
    /// 실행 중 태스크 취소 토큰
    cancel: CancellationToken,
    /// 소스 종료 후 처리 루프까지 끝나면 취소되는 토큰
    source_done: CancellationToken,
    /// 수집기 실패 사유 (한 번만 설정)
    source_error: Arc<OnceLock<String>>,
    /// 백그라운드 태스크 핸들
    tasks: Vec<JoinHandle<()>>,
}

impl<M, N> ChatPipeline<M, N> {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 소스 이름
    pub fn source_name(&self) -> &str {
        &self.config.source_name
    }

    /// 처리 카운터
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// 소스가 끝나고 남은 이벤트 처리까지 완료되면 취소되는 토큰
    ///
    /// `start()`마다 새 토큰이 만들어지므로 시작 후에 가져와야 합니다.
    pub fn source_done(&self) -> CancellationToken {
        self.source_done.clone()
    }

    /// 수집기가 에러로 끝났다면 그 사유
    pub fn source_error(&self) -> Option<&str> {
        self.source_error.get().map(String::as_str)
    }
}

impl<M: ModerationModel, N: Notifier> ChatPipeline<M, N> {
    fn worker(&self) -> Result<EventWorker<M, N>, ChatPipelineError> {
        Ok(EventWorker {
            source: Arc::from(self.config.source_name.as_str()),
            classifier: self.classifier.clone(),
            dispatcher: self.dispatcher.clone(),
            notices: PunishmentNoticeParser::new()?,
            punishments: self.punishments.clone(),
            stats: Arc::clone(&self.stats),
        })
    }
}

impl<M: ModerationModel, N: Notifier> Pipeline for ChatPipeline<M, N> {
    async fn start(&mut self) -> Result<(), ChatguardError> {
        if self.state == PipelineState::Running {
            return Err(chatguard_core::error::PipelineError::AlreadyRunning.into());
        }

        tracing::info!(source = %self.config.source_name, "starting chat pipeline");

        // 1. 구성 요소 준비
        let collector_config = FileCollectorConfig::from_pipeline(&self.config)?;
        let parser = ChatLineParser::new()?;
        let worker = Arc::new(self.worker()?);

        self.cancel = CancellationToken::new();
        self.source_done = CancellationToken::new();
        self.source_error = Arc::new(OnceLock::new());

        let (line_tx, line_rx) = mpsc::channel(self.config.line_channel_capacity);

        // 2. 수집기 태스크 스폰
        let mut collector = FileCollector::new(collector_config, line_tx);
        let cancel = self.cancel.clone();
        let source_error = Arc::clone(&self.source_error);
        let source = self.config.source_name.clone();
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = collector.run(cancel).await {
                counter!(m::SOURCE_FAILURES_TOTAL, m::LABEL_SOURCE => source.clone()).increment(1);
                tracing::error!(source = %source, error = %e, "log source terminated");
                let _ = source_error.set(e.to_string());
            }
        }));

        // 3. 처리 루프 스폰
        let limiter = Arc::new(Semaphore::new(self.config.max_in_flight_events));
        let cancel = self.cancel.clone();
        let source_done = self.source_done.clone();
        self.tasks.push(tokio::spawn(async move {
            process_lines(line_rx, parser, worker, limiter, cancel).await;
            source_done.cancel();
        }));

        self.state = PipelineState::Running;
        tracing::info!(source = %self.config.source_name, "chat pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ChatguardError> {
        if self.state != PipelineState::Running {
            return Err(chatguard_core::error::PipelineError::NotRunning.into());
        }

        tracing::info!(source = %self.config.source_name, "stopping chat pipeline");

        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.source_done.cancel();

        self.state = PipelineState::Stopped;
        tracing::info!(
            source = %self.config.source_name,
            lines = self.stats.lines_received(),
            events = self.stats.events_parsed(),
            notifications = self.stats.notifications(),
            "chat pipeline stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => match self.source_error.get() {
                Some(reason) => HealthStatus::Unhealthy(format!("source failed: {reason}")),
                None => HealthStatus::Healthy,
            },
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 수집된 라인을 파싱하고 이벤트마다 분류 태스크를 띄웁니다.
///
/// 수집기가 끝나 채널이 닫히면 남은 분류 태스크를 기다린 뒤 반환하고,
/// 취소되면 진행 중인 태스크를 버리고 즉시 반환합니다.
async fn process_lines<M: ModerationModel, N: Notifier>(
    mut rx: mpsc::Receiver<RawLine>,
    parser: ChatLineParser,
    worker: Arc<EventWorker<M, N>>,
    limiter: Arc<Semaphore>,
    cancel: CancellationToken,
) {
    let mut in_flight = JoinSet::new();

    loop {
        let raw = tokio::select! {
            _ = cancel.cancelled() => {
                in_flight.shutdown().await;
                return;
            }
            raw = rx.recv() => match raw {
                Some(raw) => raw,
                None => break,
            },
        };

        while in_flight.try_join_next().is_some() {}

        worker.stats.lines_received.fetch_add(1, Ordering::Relaxed);

        let Some(event) = parser.parse(&raw.line) else {
            tracing::trace!(source = %raw.source, "line is not chat");
            continue;
        };
        worker.stats.events_parsed.fetch_add(1, Ordering::Relaxed);
        counter!(m::EVENTS_PARSED_TOTAL, m::LABEL_SOURCE => raw.source.clone()).increment(1);

        if let Some(line) = general_chat_line(&raw.source, &event) {
            tracing::info!("{}", line);
        }

        let permit = tokio::select! {
            _ = cancel.cancelled() => {
                in_flight.shutdown().await;
                return;
            }
            permit = Arc::clone(&limiter).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let worker = Arc::clone(&worker);
        in_flight.spawn(async move { worker.handle(event, permit).await });
    }

    while in_flight.join_next().await.is_some() {}
}

/// 일반 채널 대화를 운영 로그용 한 줄로 만듭니다.
///
/// 처벌 공지(`System`)는 플레이어 대화가 아니므로 제외합니다.
fn general_chat_line(source: &str, event: &ChatEvent) -> Option<String> {
    if event.channel != Channel::General || event.player == SYSTEM_PLAYER {
        return None;
    }
    Some(format!(
        "({} {}) {}: {}",
        source,
        Channel::GENERAL,
        event.player,
        event.text
    ))
}

/// 채팅 파이프라인 빌더
pub struct ChatPipelineBuilder<M = NoModel, N = LogNotifier> {
    config: PipelineConfig,
    classifier: Option<Classifier<M>>,
    notifier: Arc<N>,
    notify_timeout: Duration,
    punishments: Option<Arc<PunishmentStore>>,
}

impl ChatPipelineBuilder<NoModel, LogNotifier> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            classifier: None,
            notifier: Arc::new(LogNotifier),
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            punishments: None,
        }
    }
}

impl Default for ChatPipelineBuilder<NoModel, LogNotifier> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M, N> ChatPipelineBuilder<M, N> {
    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 분류기를 지정합니다. 모델 타입이 분류기를 따라 바뀝니다.
    pub fn classifier<M2>(self, classifier: Classifier<M2>) -> ChatPipelineBuilder<M2, N> {
        ChatPipelineBuilder {
            config: self.config,
            classifier: Some(classifier),
            notifier: self.notifier,
            notify_timeout: self.notify_timeout,
            punishments: self.punishments,
        }
    }

    /// 알림 전송 수단을 지정합니다. 설정하지 않으면 로그로만 남깁니다.
    pub fn notifier<N2>(self, notifier: Arc<N2>) -> ChatPipelineBuilder<M, N2> {
        ChatPipelineBuilder {
            config: self.config,
            classifier: self.classifier,
            notifier,
            notify_timeout: self.notify_timeout,
            punishments: self.punishments,
        }
    }

    /// 알림 한 건의 전송 제한 시간을 지정합니다.
    pub fn notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// 처벌 공지를 기록할 저장소를 지정합니다.
    pub fn punishment_store(mut self, store: Arc<PunishmentStore>) -> Self {
        self.punishments = Some(store);
        self
    }
}

impl<M: ModerationModel, N: Notifier> ChatPipelineBuilder<M, N> {
    /// 파이프라인을 빌드합니다.
    ///
    /// # Errors
    /// - 설정이 유효하지 않은 경우
    /// - 분류기를 지정하지 않은 경우
    pub fn build(self) -> Result<ChatPipeline<M, N>, ChatPipelineError> {
        self.config.validate()?;

        let classifier = self.classifier.ok_or_else(|| ChatPipelineError::Config {
            field: "classifier".to_owned(),
            reason: "classifier must be set".to_owned(),
        })?;

        Ok(ChatPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            classifier,
            dispatcher: Dispatcher::with_timeout(self.notifier, self.notify_timeout),
            punishments: self.punishments,
            stats: Arc::new(PipelineStats::default()),
            cancel: CancellationToken::new(),
            source_done: CancellationToken::new(),
            source_error: Arc::new(OnceLock::new()),
            tasks: Vec::new(),
        })
    }
}
