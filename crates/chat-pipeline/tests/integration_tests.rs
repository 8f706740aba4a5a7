//! 통합 테스트 -- 파싱부터 알림까지의 전체 흐름 검증
//!
//! 네트워크 대신 `ModerationModel`/`Notifier`의 가짜 구현을 사용합니다.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chatguard_core::pipeline::Pipeline;
use chatguard_core::types::{ChatEvent, ClassificationOutcome, NotificationKind};
use chatguard_pipeline::{
    ChatLineParser, ChatPipelineBuilder, ChatPipelineError, Classifier, Dispatcher, ModelStage,
    ModerationGate, ModerationModel, Notifier, PipelineConfig, PlayerContextStore, Prompts,
    RuleLoader, RuleSet, RuleSets,
};

const ALICE_LINE: &str =
    "[12:00:00] [INFO] [Client thread/]: [Торговый] Alice -> world: buy diamonds cheap";

// --- 가짜 구현 ---

/// 호출 구간을 기록하는 모델
struct InstrumentedModel {
    reply: String,
    delay: Duration,
    calls: AtomicUsize,
    windows: Mutex<Vec<(Instant, Instant)>>,
}

impl InstrumentedModel {
    fn new(reply: &str, delay: Duration) -> Self {
        Self {
            reply: reply.to_owned(),
            delay,
            calls: AtomicUsize::new(0),
            windows: Mutex::new(Vec::new()),
        }
    }
}

impl ModerationModel for InstrumentedModel {
    async fn complete(
        &self,
        _system_prompt: &str,
        _message: &str,
    ) -> Result<String, ChatPipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let start = Instant::now();
        tokio::time::sleep(self.delay).await;
        self.windows.lock().unwrap().push((start, Instant::now()));
        Ok(self.reply.clone())
    }
}

/// 보낸 메시지를 기록하는 전송 수단
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), ChatPipelineError> {
        self.sent.lock().unwrap().push(text.to_owned());
        if self.fail {
            return Err(ChatPipelineError::Notify("bot blocked".to_owned()));
        }
        Ok(())
    }
}

// --- 헬퍼 ---

fn rules(whitelist: &[&str]) -> Arc<RuleSets> {
    Arc::new(RuleSets {
        whitelist: RuleSet::new(whitelist.iter().copied()),
        alert: RuleSet::new(["админ"]),
        violation: RuleSet::new(["diamonds cheap", "мошенник"]),
        trade: RuleSet::new(["продам", "куплю"]),
    })
}

fn prompts() -> Arc<Prompts> {
    Arc::new(Prompts {
        global: "global prompt".to_owned(),
        trade: "trade prompt".to_owned(),
        default: "default prompt".to_owned(),
    })
}

fn model_classifier<M: ModerationModel>(
    gate: Arc<ModerationGate<M>>,
    context: Arc<PlayerContextStore>,
) -> Classifier<M> {
    let stage = ModelStage::new(gate, prompts(), ["глобальный", "торговый"]);
    Classifier::new(rules(&[]), context, Some(stage))
}

/// 게임 클라이언트처럼 cp1251로 인코딩한 줄을 덧붙입니다.
fn append(path: &Path, line: &str) {
    let text = format!("{line}\n");
    let (bytes, _, unmappable) = encoding_rs::WINDOWS_1251.encode(&text);
    assert!(!unmappable);
    let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// --- 종단 시나리오 ---

/// 위반 키워드가 있는 거래 채널 라인 -> KeywordViolation + violation 알림
#[tokio::test]
async fn test_trade_keyword_violation_is_dispatched() {
    let parser = ChatLineParser::new().unwrap();
    let classifier = Classifier::rules_only(rules(&[]), Arc::new(PlayerContextStore::default()));
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = Dispatcher::new(Arc::clone(&notifier));

    let event = parser.parse(ALICE_LINE).unwrap();
    let outcome = classifier.classify(&event).await;
    assert_eq!(
        outcome,
        ClassificationOutcome::KeywordViolation("diamonds cheap".to_owned())
    );

    let notification = dispatcher.dispatch(&event, &outcome).await.unwrap();
    assert_eq!(notification.kind, NotificationKind::Violation);
    assert_eq!(notification.player, "Alice");
    assert_eq!(notification.channel, "торговый");
    assert_eq!(notification.reason, "diamonds cheap");
    assert_eq!(
        notifier.messages(),
        vec!["Нарушение: diamonds cheap (торговый) Alice: buy diamonds cheap"]
    );
}

/// 같은 라인이라도 화이트리스트에 걸리면 Whitelisted, 알림 없음
#[tokio::test]
async fn test_whitelist_suppresses_dispatch() {
    let parser = ChatLineParser::new().unwrap();
    let classifier =
        Classifier::rules_only(rules(&["diamonds"]), Arc::new(PlayerContextStore::default()));
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = Dispatcher::new(Arc::clone(&notifier));

    let event = parser.parse(ALICE_LINE).unwrap();
    let outcome = classifier.classify(&event).await;
    assert_eq!(outcome, ClassificationOutcome::Whitelisted);
    assert!(dispatcher.dispatch(&event, &outcome).await.is_none());
    assert!(notifier.messages().is_empty());
}

/// 일반 채널은 어떤 규칙이 있어도 Ignored
#[tokio::test]
async fn test_general_channel_is_never_moderated() {
    let gate = Arc::new(ModerationGate::new(InstrumentedModel::new(
        "Нарушение 1.1",
        Duration::ZERO,
    )));
    let classifier = model_classifier(Arc::clone(&gate), Arc::new(PlayerContextStore::default()));
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = Dispatcher::new(Arc::clone(&notifier));

    for text in ["spam spam spam", "мошенник", "позовите админ"] {
        let event = ChatEvent::new("Общий", "Bob", text).unwrap();
        let outcome = classifier.classify(&event).await;
        assert_eq!(outcome, ClassificationOutcome::Ignored);
        assert!(dispatcher.dispatch(&event, &outcome).await.is_none());
    }
    assert!(notifier.messages().is_empty());
    assert_eq!(gate.model().calls.load(Ordering::SeqCst), 0);
}

/// 알림 키워드가 위반 키워드보다 먼저 평가됨
#[tokio::test]
async fn test_alert_precedes_violation() {
    let classifier = Classifier::rules_only(rules(&[]), Arc::new(PlayerContextStore::default()));
    let event = ChatEvent::new("Глобальный", "Eve", "админ, тут мошенник").unwrap();
    assert_eq!(
        classifier.classify(&event).await,
        ClassificationOutcome::AlertMatch("админ".to_owned())
    );
}

// --- 모델 게이트 ---

/// 동시에 들어온 모델 호출은 실행 구간이 겹치지 않음
#[tokio::test]
async fn test_gate_serializes_concurrent_model_calls() {
    let gate = Arc::new(ModerationGate::new(InstrumentedModel::new(
        "Нарушений нет",
        Duration::from_millis(30),
    )));
    let classifier = model_classifier(Arc::clone(&gate), Arc::new(PlayerContextStore::default()));

    let mut handles = Vec::new();
    for i in 0..4 {
        let classifier = classifier.clone();
        handles.push(tokio::spawn(async move {
            let event = ChatEvent::new("Глобальный", format!("p{i}"), "всем привет").unwrap();
            classifier.classify(&event).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), ClassificationOutcome::ModelClean);
    }

    let mut windows = gate.model().windows.lock().unwrap().clone();
    assert_eq!(windows.len(), 4);
    windows.sort_by_key(|(start, _)| *start);
    for pair in windows.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "model calls overlapped");
    }
}

/// 규칙 단계는 모델 호출이 진행 중이어도 기다리지 않음
#[tokio::test]
async fn test_rule_stages_do_not_wait_for_gate() {
    let gate = Arc::new(ModerationGate::new(InstrumentedModel::new(
        "Нарушений нет",
        Duration::from_secs(2),
    )));
    let classifier = model_classifier(Arc::clone(&gate), Arc::new(PlayerContextStore::default()));

    let slow = {
        let classifier = classifier.clone();
        tokio::spawn(async move {
            let event = ChatEvent::new("Глобальный", "Slow", "долгая проверка").unwrap();
            classifier.classify(&event).await
        })
    };
    wait_until(|| gate.is_busy()).await;

    let event = ChatEvent::new("Глобальный", "Fast", "тут мошенник").unwrap();
    let outcome = tokio::time::timeout(Duration::from_millis(500), classifier.classify(&event))
        .await
        .expect("rule stage blocked on the model gate");
    assert_eq!(
        outcome,
        ClassificationOutcome::KeywordViolation("мошенник".to_owned())
    );

    slow.abort();
}

/// 타임아웃이면 ModelClean이고 다음 이벤트는 바로 처리됨
#[tokio::test(start_paused = true)]
async fn test_model_timeout_degrades_to_clean() {
    let gate = Arc::new(ModerationGate::with_timeout(
        InstrumentedModel::new("Нарушение 2.1", Duration::from_secs(60)),
        Duration::from_secs(30),
    ));
    let classifier = model_classifier(Arc::clone(&gate), Arc::new(PlayerContextStore::default()));

    let started = tokio::time::Instant::now();
    let event = ChatEvent::new("Торговый", "Tim", "кто-нибудь онлайн?").unwrap();
    assert_eq!(
        classifier.classify(&event).await,
        ClassificationOutcome::ModelClean
    );
    assert!(started.elapsed() < Duration::from_secs(31));
    assert!(!gate.is_busy());

    let next = ChatEvent::new("Торговый", "Tim", "тут мошенник").unwrap();
    assert_eq!(
        classifier.classify(&next).await,
        ClassificationOutcome::KeywordViolation("мошенник".to_owned())
    );
}

/// 모델 판정에 위반 단어가 있으면 ModelViolation, 알림 사유는 판정 텍스트
#[tokio::test]
async fn test_model_violation_carries_verdict() {
    let gate = Arc::new(ModerationGate::new(InstrumentedModel::new(
        "МУТ на 30 минут: оскорбление",
        Duration::ZERO,
    )));
    let classifier = model_classifier(gate, Arc::new(PlayerContextStore::default()));
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = Dispatcher::new(Arc::clone(&notifier));

    let event = ChatEvent::new("Глобальный", "Rude", "ты никто").unwrap();
    let outcome = classifier.classify(&event).await;
    assert_eq!(
        outcome,
        ClassificationOutcome::ModelViolation("МУТ на 30 минут: оскорбление".to_owned())
    );
    dispatcher.dispatch(&event, &outcome).await;
    assert_eq!(
        notifier.messages(),
        vec!["Нарушение: МУТ на 30 минут: оскорбление (глобальный) Rude: ты никто"]
    );
}

// --- 컨텍스트 ---

/// 11번째 메시지가 들어오면 첫 메시지가 밀려남
#[tokio::test]
async fn test_context_keeps_last_ten_messages() {
    let context = Arc::new(PlayerContextStore::default());
    let classifier = Classifier::rules_only(rules(&[]), Arc::clone(&context));

    for i in 1..=11 {
        let event = ChatEvent::new("Локальный", "Dan", format!("message {i}")).unwrap();
        classifier.classify(&event).await;
    }

    let window = context.snapshot("Dan").unwrap();
    assert_eq!(window.len(), 10);
    assert!(!window.contains(&"message 1".to_owned()));
    assert_eq!(window.first().unwrap(), "message 2");
    assert_eq!(window.last().unwrap(), "message 11");
}

// --- 규칙 로딩 ---

/// 목록 파일은 trim/소문자화되고, 없는 파일은 빈 목록
#[tokio::test]
async fn test_rule_loader_degrades_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let list = dir.path().join("violation.txt");
    std::fs::write(&list, "  Diamonds Cheap \n\nМОШЕННИК\n").unwrap();

    let set = RuleLoader::load_list(&list).await;
    assert_eq!(set.len(), 2);
    assert_eq!(set.find_match("buy diamonds cheap"), Some("diamonds cheap"));
    assert!(set.matches("он мошенник"));

    let missing = RuleLoader::load_list(dir.path().join("absent.txt")).await;
    assert!(missing.is_empty());
}

// --- 파이프라인 ---

/// 로그 파일 tail -> 분류 -> 알림 전체 흐름, 전송 실패에도 계속 진행
#[tokio::test]
async fn test_pipeline_processes_appended_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fml-client-latest.log");
    std::fs::write(&path, "").unwrap();
    append(&path, ALICE_LINE);

    let notifier = Arc::new(RecordingNotifier {
        fail: true,
        ..RecordingNotifier::default()
    });
    let config = PipelineConfig {
        source_name: "Mobile".to_owned(),
        path: path.display().to_string(),
        poll_interval_ms: 10,
        ..PipelineConfig::default()
    };
    let mut pipeline = ChatPipelineBuilder::new()
        .config(config)
        .classifier(Classifier::rules_only(
            rules(&[]),
            Arc::new(PlayerContextStore::default()),
        ))
        .notifier(Arc::clone(&notifier))
        .build()
        .unwrap();

    pipeline.start().await.unwrap();
    assert!(pipeline.health_check().await.is_healthy());
    tokio::time::sleep(Duration::from_millis(50)).await;

    append(&path, ALICE_LINE);
    append(&path, "[12:00:01] [INFO] [Server thread/]: Saving chunks");
    append(
        &path,
        "[12:00:02] [INFO] [Client thread/]: [Глобальный] Eve -> Eve: позовите админ",
    );

    wait_until(|| notifier.messages().len() == 2).await;

    let mut messages = notifier.messages();
    messages.sort();
    assert_eq!(
        messages,
        vec![
            "(глобальный) Eve: позовите админ",
            "Нарушение: diamonds cheap (торговый) Alice: buy diamonds cheap",
        ]
    );
    assert_eq!(pipeline.stats().lines_received(), 3);
    assert_eq!(pipeline.stats().events_parsed(), 2);

    pipeline.stop().await.unwrap();
    assert!(pipeline.health_check().await.is_unhealthy());
}

/// 소스 두 개가 같은 컨텍스트 저장소를 공유
#[tokio::test]
async fn test_two_sources_share_context() {
    let dir = tempfile::tempdir().unwrap();
    let context = Arc::new(PlayerContextStore::default());
    let mut pipelines = Vec::new();

    for name in ["HiTech", "Mobile"] {
        let path = dir.path().join(format!("{name}.log"));
        std::fs::write(&path, "").unwrap();
        let config = PipelineConfig {
            source_name: name.to_owned(),
            path: path.display().to_string(),
            poll_interval_ms: 10,
            ..PipelineConfig::default()
        };
        let mut pipeline = ChatPipelineBuilder::new()
            .config(config)
            .classifier(Classifier::rules_only(rules(&[]), Arc::clone(&context)))
            .build()
            .unwrap();
        pipeline.start().await.unwrap();
        pipelines.push((path, pipeline));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    append(
        &pipelines[0].0,
        "[12:00:00] [INFO] [Client thread/]: [Локальный] Zed -> Zed: с хайтека",
    );
    append(
        &pipelines[1].0,
        "[12:00:01] [INFO] [Client thread/]: [Локальный] Zed -> Zed: с мобилки",
    );

    wait_until(|| context.snapshot("Zed").is_some_and(|w| w.len() == 2)).await;
    let mut window = context.snapshot("Zed").unwrap();
    window.sort();
    assert_eq!(window, vec!["с мобилки", "с хайтека"]);

    for (_, pipeline) in &mut pipelines {
        pipeline.stop().await.unwrap();
    }
}
