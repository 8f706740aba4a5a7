//! 분류기 -- 채팅 이벤트 하나에 대해 분류 결과 하나를 결정합니다.
//!
//! # 단계 (앞 단계가 매칭되면 즉시 종료)
//! 1. 채널 게이트: 일반 채널은 `Ignored`
//! 2. 화이트리스트: `Whitelisted`
//! 3. 알림 키워드: `AlertMatch`
//! 4. 거래 문구: 로컬 채널은 `Ignored`, 거래 채널은 위반 키워드만 검사,
//!    그 밖의 채널은 잘못된 채널 사용으로 `KeywordViolation`
//! 5. 위반 키워드: `KeywordViolation`
//! 6. 모델 검사: 모델 대상 채널만. 판정에 위반 단어가 있으면 `ModelViolation`
//! 7. 그 밖에는 `Ignored`
//!
//! 결과와 관계없이 메시지는 플레이어 컨텍스트에 추가됩니다.
//! 1~5단계는 모델 게이트를 기다리지 않습니다.

use std::sync::Arc;

use chatguard_core::types::{Channel, ChatEvent, ClassificationOutcome};

use crate::context::PlayerContextStore;
use crate::error::ChatPipelineError;
use crate::moderation::{ModerationGate, ModerationModel};
use crate::rule::{Prompts, RuleSets};

/// 거래 문구를 거래/로컬 외 채널에서 쓴 경우의 사유
pub const WRONG_CHANNEL_REASON: &str = "wrong channel";

/// 모델 검사 단계
pub struct ModelStage<M> {
    gate: Arc<ModerationGate<M>>,
    prompts: Arc<Prompts>,
    channels: Vec<Channel>,
}

impl<M> ModelStage<M> {
    /// 모델 검사 단계를 만듭니다.
    ///
    /// `channels`는 채널 이름 목록이며 대소문자를 구분하지 않습니다.
    pub fn new<I, S>(gate: Arc<ModerationGate<M>>, prompts: Arc<Prompts>, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            gate,
            prompts,
            channels: channels
                .into_iter()
                .map(|c| Channel::from_name(c.as_ref()))
                .collect(),
        }
    }

    /// 채널이 모델 검사 대상인지 여부
    pub fn covers(&self, channel: &Channel) -> bool {
        self.channels.contains(channel)
    }
}

impl<M> Clone for ModelStage<M> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            prompts: Arc::clone(&self.prompts),
            channels: self.channels.clone(),
        }
    }
}

/// 모델 검사를 쓰지 않는 분류기의 모델 자리
pub struct NoModel;

impl ModerationModel for NoModel {
    async fn complete(
        &self,
        _system_prompt: &str,
        _message: &str,
    ) -> Result<String, ChatPipelineError> {
        Err(ChatPipelineError::ModelTransport(
            "moderation model disabled".to_owned(),
        ))
    }
}

/// 채팅 이벤트 분류기
///
/// 규칙과 컨텍스트 저장소, 모델 게이트는 모두 `Arc`로 공유되므로
/// 이벤트 태스크마다 복제해서 사용합니다.
pub struct Classifier<M = NoModel> {
    rules: Arc<RuleSets>,
    context: Arc<PlayerContextStore>,
    model: Option<ModelStage<M>>,
}

impl<M> Clone for Classifier<M> {
    fn clone(&self) -> Self {
        Self {
            rules: Arc::clone(&self.rules),
            context: Arc::clone(&self.context),
            model: self.model.clone(),
        }
    }
}

impl Classifier<NoModel> {
    /// 모델 검사 없이 규칙만 쓰는 분류기를 만듭니다.
    pub fn rules_only(rules: Arc<RuleSets>, context: Arc<PlayerContextStore>) -> Self {
        Self::new(rules, context, None)
    }
}

impl<M: ModerationModel> Classifier<M> {
    /// 새 분류기를 생성합니다.
    pub fn new(
        rules: Arc<RuleSets>,
        context: Arc<PlayerContextStore>,
        model: Option<ModelStage<M>>,
    ) -> Self {
        Self {
            rules,
            context,
            model,
        }
    }

    /// 이벤트를 분류하고 플레이어 컨텍스트에 메시지를 추가합니다.
    pub async fn classify(&self, event: &ChatEvent) -> ClassificationOutcome {
        self.classify_with(event, || {}).await
    }

    /// [`classify`](Self::classify)와 같지만 모델 게이트에 들어가기 직전에
    /// `before_model`을 한 번 호출합니다. 모델 단계까지 가지 않으면 호출하지 않습니다.
    pub async fn classify_with<F>(
        &self,
        event: &ChatEvent,
        before_model: F,
    ) -> ClassificationOutcome
    where
        F: FnOnce() + Send,
    {
        let outcome = self.evaluate(event, before_model).await;
        self.context.record(&event.player, &event.text);
        outcome
    }

    async fn evaluate<F>(&self, event: &ChatEvent, before_model: F) -> ClassificationOutcome
    where
        F: FnOnce() + Send,
    {
        use ClassificationOutcome::*;

        if event.channel == Channel::General {
            return Ignored;
        }

        let text = event.lowercase_text();

        if self.rules.whitelist.matches(&text) {
            return Whitelisted;
        }

        if let Some(keyword) = self.rules.alert.find_match(&text) {
            return AlertMatch(keyword.to_owned());
        }

        if self.rules.trade.matches(&text) {
            return match event.channel {
                Channel::Local => Ignored,
                // 거래 채널의 거래 문구는 키워드 검사만 하고 모델로 보내지 않습니다.
                Channel::Trade => self
                    .rules
                    .violation
                    .find_match(&text)
                    .map_or(Ignored, |keyword| KeywordViolation(keyword.to_owned())),
                _ => KeywordViolation(WRONG_CHANNEL_REASON.to_owned()),
            };
        }

        if let Some(keyword) = self.rules.violation.find_match(&text) {
            return KeywordViolation(keyword.to_owned());
        }

        if let Some(stage) = self.model.as_ref().filter(|s| s.covers(&event.channel)) {
            before_model();
            let prompt = stage.prompts.for_channel(&event.channel);
            let verdict = stage.gate.classify(&event.text, prompt).await;
            return if verdict.is_violation() {
                ModelViolation(verdict.as_str().to_owned())
            } else {
                ModelClean
            };
        }

        Ignored
    }

    /// 플레이어 컨텍스트 저장소
    pub fn context(&self) -> &Arc<PlayerContextStore> {
        &self.context
    }

    /// 모델 검사 단계가 설정되어 있는지 여부
    pub fn has_model_stage(&self) -> bool {
        self.model.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::mock::MockModel;
    use crate::rule::RuleSet;
    use chatguard_core::types::ClassificationOutcome::*;
    use std::time::Duration;

    fn rules() -> Arc<RuleSets> {
        Arc::new(RuleSets {
            whitelist: RuleSet::new(["diamonds"]),
            alert: RuleSet::new(["админ"]),
            violation: RuleSet::new(["diamonds cheap", "читы", "скам"]),
            trade: RuleSet::new(["продам", "куплю"]),
        })
    }

    fn event(channel: &str, text: &str) -> ChatEvent {
        ChatEvent::new(channel, "Alice", text).unwrap()
    }

    fn with_model(model: MockModel) -> Classifier<MockModel> {
        let gate = Arc::new(ModerationGate::with_timeout(model, Duration::from_secs(30)));
        let prompts = Arc::new(Prompts {
            global: "global prompt".to_owned(),
            trade: "trade prompt".to_owned(),
            default: "default prompt".to_owned(),
        });
        let stage = ModelStage::new(gate, prompts, ["глобальный", "торговый"]);
        Classifier::new(rules(), Arc::new(PlayerContextStore::default()), Some(stage))
    }

    #[tokio::test]
    async fn general_channel_is_always_ignored() {
        let classifier = with_model(MockModel::replying("нарушение"));
        for text in ["spam spam spam", "админ", "читы", "продам"] {
            assert_eq!(classifier.classify(&event("Общий", text)).await, Ignored);
        }
        assert_eq!(classifier.model.as_ref().unwrap().gate.model().call_count(), 0);
    }

    #[tokio::test]
    async fn whitelist_beats_everything() {
        let classifier = Classifier::rules_only(rules(), Arc::new(PlayerContextStore::default()));
        let outcome = classifier
            .classify(&event("Торговый", "buy diamonds cheap, админ"))
            .await;
        assert_eq!(outcome, Whitelisted);
    }

    #[tokio::test]
    async fn alert_beats_violation() {
        let classifier = Classifier::rules_only(rules(), Arc::new(PlayerContextStore::default()));
        let outcome = classifier
            .classify(&event("Глобальный", "админ, тут читы"))
            .await;
        assert_eq!(outcome, AlertMatch("админ".to_owned()));
    }

    #[tokio::test]
    async fn violation_keyword_is_reported() {
        let classifier = Classifier::rules_only(rules(), Arc::new(PlayerContextStore::default()));
        let outcome = classifier.classify(&event("Глобальный", "Продаю ЧИТЫ")).await;
        assert_eq!(outcome, KeywordViolation("читы".to_owned()));
    }

    #[tokio::test]
    async fn trade_phrase_in_local_is_ignored() {
        let classifier = with_model(MockModel::replying("нарушение"));
        let outcome = classifier.classify(&event("Локальный", "продам меч, скам")).await;
        assert_eq!(outcome, Ignored);
    }

    #[tokio::test]
    async fn trade_phrase_in_trade_skips_model() {
        let classifier = with_model(MockModel::replying("нарушение"));
        assert_eq!(
            classifier.classify(&event("Торговый", "продам меч")).await,
            Ignored
        );
        assert_eq!(
            classifier.classify(&event("Торговый", "продам меч, скам")).await,
            KeywordViolation("скам".to_owned())
        );
        assert_eq!(classifier.model.as_ref().unwrap().gate.model().call_count(), 0);
    }

    #[tokio::test]
    async fn trade_phrase_elsewhere_is_wrong_channel() {
        let classifier = Classifier::rules_only(rules(), Arc::new(PlayerContextStore::default()));
        assert_eq!(
            classifier.classify(&event("Глобальный", "куплю алмазы")).await,
            KeywordViolation(WRONG_CHANNEL_REASON.to_owned())
        );
        assert_eq!(
            classifier.classify(&event("Клан", "куплю алмазы")).await,
            KeywordViolation(WRONG_CHANNEL_REASON.to_owned())
        );
    }

    #[tokio::test]
    async fn model_violation_carries_verdict() {
        let classifier = with_model(MockModel::replying("Нарушение пункта 2.1, мут 30м"));
        let outcome = classifier.classify(&event("Глобальный", "ты нуб")).await;
        assert_eq!(
            outcome,
            ModelViolation("Нарушение пункта 2.1, мут 30м".to_owned())
        );
    }

    #[tokio::test]
    async fn clean_verdict_is_model_clean() {
        let classifier = with_model(MockModel::replying("Всё в порядке"));
        let outcome = classifier.classify(&event("Торговый", "всем привет")).await;
        assert_eq!(outcome, ModelClean);
    }

    #[tokio::test]
    async fn model_failure_is_model_clean() {
        let classifier = with_model(MockModel::failing("boom"));
        let outcome = classifier.classify(&event("Глобальный", "всем привет")).await;
        assert_eq!(outcome, ModelClean);
    }

    #[tokio::test]
    async fn before_model_hook_runs_only_for_model_checks() {
        let classifier = with_model(MockModel::replying("Всё в порядке"));

        let mut reached = false;
        let outcome = classifier
            .classify_with(&event("Глобальный", "позовите админ"), || reached = true)
            .await;
        assert_eq!(outcome, AlertMatch("админ".to_owned()));
        assert!(!reached);

        let mut reached = false;
        let outcome = classifier
            .classify_with(&event("Глобальный", "всем привет"), || reached = true)
            .await;
        assert_eq!(outcome, ModelClean);
        assert!(reached);
    }

    #[tokio::test]
    async fn unmonitored_channels_get_no_model_check() {
        let classifier = with_model(MockModel::replying("нарушение"));
        assert_eq!(
            classifier.classify(&event("Локальный", "всем привет")).await,
            Ignored
        );
        assert_eq!(
            classifier.classify(&event("Клан", "всем привет")).await,
            Ignored
        );
        assert_eq!(classifier.model.as_ref().unwrap().gate.model().call_count(), 0);
    }

    #[tokio::test]
    async fn without_model_stage_monitored_channels_are_ignored() {
        let classifier = Classifier::rules_only(rules(), Arc::new(PlayerContextStore::default()));
        assert!(!classifier.has_model_stage());
        assert_eq!(
            classifier.classify(&event("Глобальный", "всем привет")).await,
            Ignored
        );
    }

    #[tokio::test]
    async fn context_is_recorded_for_every_outcome() {
        let classifier = Classifier::rules_only(rules(), Arc::new(PlayerContextStore::default()));
        classifier.classify(&event("Общий", "one")).await;
        classifier.classify(&event("Торговый", "diamonds two")).await;
        classifier.classify(&event("Глобальный", "читы three")).await;

        let window = classifier.context().snapshot("Alice").unwrap();
        assert_eq!(window, vec!["one", "diamonds two", "читы three"]);
    }
}
