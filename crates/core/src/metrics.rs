//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::histogram!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `chatguard_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(chatguard_core::metrics::LINES_READ_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 로그 소스 레이블 키 (설정의 source name)
pub const LABEL_SOURCE: &str = "source";

/// 분류 결과 레이블 키 (ignored, whitelisted, alert, ...)
pub const LABEL_OUTCOME: &str = "outcome";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── 파이프라인 메트릭 ─────────────────────────────────────────────

/// 로그 파일에서 읽은 라인 수 (counter, label: source)
pub const LINES_READ_TOTAL: &str = "chatguard_lines_read_total";

/// 채팅 이벤트로 파싱된 라인 수 (counter, label: source)
pub const EVENTS_PARSED_TOTAL: &str = "chatguard_events_parsed_total";

/// 분류 결과별 이벤트 수 (counter, label: outcome)
pub const OUTCOMES_TOTAL: &str = "chatguard_outcomes_total";

/// 소스 실패 수 (counter, label: source)
pub const SOURCE_FAILURES_TOTAL: &str = "chatguard_source_failures_total";

// ─── 모델 / 알림 메트릭 ────────────────────────────────────────────

/// 외부 모더레이션 모델 호출 수 (counter, label: result)
pub const MODEL_CALLS_TOTAL: &str = "chatguard_model_calls_total";

/// 외부 모더레이션 모델 호출 지연 시간 (histogram, 초)
pub const MODEL_CALL_DURATION_SECONDS: &str = "chatguard_model_call_duration_seconds";

/// 알림 전송 수 (counter, label: result)
pub const NOTIFICATIONS_TOTAL: &str = "chatguard_notifications_total";

// ─── 데몬 메트릭 ───────────────────────────────────────────────────

/// 데몬 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "chatguard_daemon_uptime_seconds";

/// 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "chatguard_daemon_build_info";

/// 감시 중인 로그 소스 수 (gauge)
pub const DAEMON_SOURCES: &str = "chatguard_daemon_sources";

/// 모든 메트릭 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(LINES_READ_TOTAL, "Lines read from watched game logs");
    describe_counter!(
        EVENTS_PARSED_TOTAL,
        "Lines recognised as chat events by the parser"
    );
    describe_counter!(OUTCOMES_TOTAL, "Classified chat events per outcome");
    describe_counter!(
        SOURCE_FAILURES_TOTAL,
        "Log sources that terminated with a fatal error"
    );
    describe_counter!(
        MODEL_CALLS_TOTAL,
        "External moderation model calls by result"
    );
    describe_histogram!(
        MODEL_CALL_DURATION_SECONDS,
        "External moderation model round-trip latency in seconds"
    );
    describe_counter!(NOTIFICATIONS_TOTAL, "Notification deliveries by result");

    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
    describe_gauge!(DAEMON_BUILD_INFO, "Daemon build information");
    describe_gauge!(DAEMON_SOURCES, "Number of watched log sources");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_share_prefix() {
        for name in [
            LINES_READ_TOTAL,
            EVENTS_PARSED_TOTAL,
            OUTCOMES_TOTAL,
            SOURCE_FAILURES_TOTAL,
            MODEL_CALLS_TOTAL,
            MODEL_CALL_DURATION_SECONDS,
            NOTIFICATIONS_TOTAL,
            DAEMON_UPTIME_SECONDS,
            DAEMON_BUILD_INFO,
            DAEMON_SOURCES,
        ] {
            assert!(name.starts_with("chatguard_"), "{name}");
        }
    }

    #[test]
    fn describe_all_without_recorder_is_noop() {
        describe_all();
    }
}
