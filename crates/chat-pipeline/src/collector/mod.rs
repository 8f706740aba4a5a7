//! 로그 수집 모듈 -- 게임 클라이언트 로그에서 새 라인을 수집합니다.
//!
//! # 수집 소스
//! - [`FileCollector`]: 파일 감시 (tail -f 방식, 로테이션 감지)
//!
//! # 아키텍처
//! 수집기는 자체 tokio 태스크에서 실행되며, 디코딩된 라인을
//! `tokio::mpsc::Sender<RawLine>` 채널을 통해 파이프라인으로 전달합니다.

pub mod file;

pub use file::{FileCollector, FileCollectorConfig};

use std::time::SystemTime;

/// 수집된 원시 라인
///
/// 수집기가 생성하고, 파서가 소비하는 중간 데이터 형식입니다.
/// 줄바꿈 문자는 제거된 상태입니다.
#[derive(Debug, Clone)]
pub struct RawLine {
    /// 디코딩된 라인 텍스트
    pub line: String,
    /// 수집 소스 이름 (예: "HiTech")
    pub source: String,
    /// 수집 시각
    pub received_at: SystemTime,
}

impl RawLine {
    /// 새 RawLine을 생성합니다.
    pub fn new(line: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            source: source.into(),
            received_at: SystemTime::now(),
        }
    }
}

/// 수집기 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorStatus {
    /// 실행 대기 중
    Idle,
    /// 실행 중
    Running,
    /// 에러로 중단됨
    Error(String),
    /// 정상 종료됨
    Stopped,
}
