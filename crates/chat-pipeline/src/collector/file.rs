//! 파일 기반 로그 수집기
//!
//! 로그 파일을 감시하며 새로운 라인이 추가되면 수집합니다.
//! `tail -f`와 유사한 동작을 비동기 방식으로 구현합니다.
//!
//! # 동작
//! - 시작 시 파일 끝으로 이동 (과거 내용은 읽지 않음)
//! - 시작 시 파일이 없으면 `SourceUnavailable`로 즉시 종료
//! - 새 데이터가 없으면 `poll_interval`만큼 대기
//! - 레거시 코드 페이지 디코딩, 잘못된 바이트는 대체 문자로 치환
//!
//! # 로테이션 감지
//! - inode 변경 감지 (logrotate 등, Unix 전용)
//! - 파일 크기 축소 감지 (truncation)
//! - 새 파일은 처음부터 읽음

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use encoding_rs::Encoding;
use metrics::counter;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use chatguard_core::metrics as m;

use super::{CollectorStatus, RawLine};
use crate::config::PipelineConfig;
use crate::error::ChatPipelineError;

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct FileCollectorConfig {
    /// 소스 이름
    pub source_name: String,
    /// 감시할 파일 경로
    pub path: PathBuf,
    /// 파일 인코딩
    pub encoding: &'static Encoding,
    /// 새 데이터가 없을 때 대기 간격
    pub poll_interval: Duration,
    /// 최대 라인 길이 (바이트)
    pub max_line_length: usize,
}

impl FileCollectorConfig {
    /// 파이프라인 설정에서 수집기 설정을 생성합니다.
    pub fn from_pipeline(config: &PipelineConfig) -> Result<Self, ChatPipelineError> {
        Ok(Self {
            source_name: config.source_name.clone(),
            path: PathBuf::from(&config.path),
            encoding: config.resolve_encoding()?,
            poll_interval: config.poll_interval(),
            max_line_length: config.max_line_length,
        })
    }
}

/// 현재 열려 있는 파일의 추적 상태
struct OpenFile {
    reader: BufReader<File>,
    /// 마지막 읽기 위치 (바이트 오프셋)
    offset: u64,
    /// 파일 식별자 (Unix inode)
    file_id: Option<u64>,
}

/// 파일 기반 로그 수집기
///
/// 파일을 주기적으로 폴링하여 새로운 로그 라인을 수집합니다.
/// 줄바꿈이 아직 오지 않은 마지막 라인은 다음 폴링까지 버퍼에 보관합니다.
pub struct FileCollector {
    config: FileCollectorConfig,
    tx: mpsc::Sender<RawLine>,
    status: CollectorStatus,
    lines_read: u64,
}

impl FileCollector {
    /// 새 파일 수집기를 생성합니다.
    pub fn new(config: FileCollectorConfig, tx: mpsc::Sender<RawLine>) -> Self {
        Self {
            config,
            tx,
            status: CollectorStatus::Idle,
            lines_read: 0,
        }
    }

    /// 수집기를 시작합니다.
    ///
    /// 취소되거나 파일을 더 이상 읽을 수 없을 때까지 실행됩니다.
    /// `tokio::spawn`으로 별도 태스크에서 호출하세요.
    ///
    /// # Errors
    /// - 시작 시 파일이 없거나 열 수 없는 경우 (`SourceUnavailable`)
    /// - 감시 도중 읽기 에러가 발생한 경우 (`SourceIo`)
    /// - 수신 측 채널이 닫힌 경우 (`Channel`)
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), ChatPipelineError> {
        let result = self.watch(cancel).await;
        self.status = match &result {
            Ok(()) => CollectorStatus::Stopped,
            Err(e) => CollectorStatus::Error(e.to_string()),
        };
        result
    }

    async fn watch(&mut self, cancel: CancellationToken) -> Result<(), ChatPipelineError> {
        let mut file = self.open_at_end().await?;
        self.status = CollectorStatus::Running;
        info!(
            source = %self.config.source_name,
            path = %self.config.path.display(),
            "started watching log file"
        );

        let mut pending: Vec<u8> = Vec::new();
        let mut discarding = false;

        loop {
            if cancel.is_cancelled() {
                info!(source = %self.config.source_name, "file collector received shutdown signal");
                return Ok(());
            }

            // 라인 길이 상한 + 1 바이트까지만 읽어 버퍼가 무한히 커지지 않게 합니다.
            let budget = (self.config.max_line_length + 1).saturating_sub(pending.len()) as u64;
            let n = (&mut file.reader)
                .take(budget)
                .read_until(b'\n', &mut pending)
                .await
                .map_err(|e| self.io_error(e))?;

            if n == 0 {
                if self.check_rotation(&mut file).await? {
                    pending.clear();
                    discarding = false;
                    continue;
                }
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    _ = cancel.cancelled() => {
                        info!(source = %self.config.source_name, "file collector received shutdown signal");
                        return Ok(());
                    }
                }
                continue;
            }

            file.offset += n as u64;

            if pending.last() == Some(&b'\n') {
                if discarding {
                    discarding = false;
                } else {
                    self.emit(&pending).await?;
                }
                pending.clear();
            } else if pending.len() > self.config.max_line_length {
                if !discarding {
                    warn!(
                        source = %self.config.source_name,
                        max_line_length = self.config.max_line_length,
                        "line exceeds max length, skipping"
                    );
                }
                discarding = true;
                pending.clear();
            }
        }
    }

    /// 파일을 열고 끝으로 이동합니다.
    async fn open_at_end(&self) -> Result<OpenFile, ChatPipelineError> {
        let file = File::open(&self.config.path)
            .await
            .map_err(|e| ChatPipelineError::SourceUnavailable {
                source_name: self.config.source_name.clone(),
                path: self.config.path.display().to_string(),
                reason: e.to_string(),
            })?;
        let meta = file.metadata().await.map_err(|e| self.io_error(e))?;
        let mut reader = BufReader::new(file);
        let offset = reader
            .seek(SeekFrom::End(0))
            .await
            .map_err(|e| self.io_error(e))?;
        Ok(OpenFile {
            reader,
            offset,
            file_id: file_id(&meta),
        })
    }

    /// 로테이션 여부를 확인합니다.
    ///
    /// 새 파일로 교체되었으면 새 파일을 처음부터 엽니다.
    /// truncation이면 현재 파일을 처음으로 되감습니다.
    /// 읽기 위치가 초기화되었으면 `true`를 반환합니다.
    async fn check_rotation(&self, file: &mut OpenFile) -> Result<bool, ChatPipelineError> {
        let meta = match tokio::fs::metadata(&self.config.path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // 로테이션 도중 잠시 파일이 없을 수 있습니다.
                debug!(source = %self.config.source_name, "log file temporarily missing");
                return Ok(false);
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let current_id = file_id(&meta);
        if current_id.is_some() && current_id != file.file_id {
            info!(
                source = %self.config.source_name,
                path = %self.config.path.display(),
                "log file rotated, reopening"
            );
            let new_file = File::open(&self.config.path)
                .await
                .map_err(|e| self.io_error(e))?;
            *file = OpenFile {
                reader: BufReader::new(new_file),
                offset: 0,
                file_id: current_id,
            };
            return Ok(true);
        }

        if meta.len() < file.offset {
            info!(
                source = %self.config.source_name,
                old_offset = file.offset,
                new_len = meta.len(),
                "log file truncated, restarting from beginning"
            );
            file.reader
                .seek(SeekFrom::Start(0))
                .await
                .map_err(|e| self.io_error(e))?;
            file.offset = 0;
            return Ok(true);
        }

        Ok(false)
    }

    /// 완성된 라인을 디코딩하여 파이프라인으로 전송합니다.
    async fn emit(&mut self, bytes: &[u8]) -> Result<(), ChatPipelineError> {
        let trimmed = strip_line_ending(bytes);
        let (text, had_errors) = self.config.encoding.decode_without_bom_handling(trimmed);
        if had_errors {
            debug!(
                source = %self.config.source_name,
                "replaced undecodable bytes in log line"
            );
        }

        self.lines_read += 1;
        counter!(m::LINES_READ_TOTAL, m::LABEL_SOURCE => self.config.source_name.clone())
            .increment(1);

        let raw = RawLine::new(text.into_owned(), self.config.source_name.clone());
        if let Err(e) = self.tx.send(raw).await {
            error!(source = %self.config.source_name, "failed to send line to pipeline: {e}");
            return Err(ChatPipelineError::Channel(e.to_string()));
        }
        Ok(())
    }

    fn io_error(&self, e: std::io::Error) -> ChatPipelineError {
        ChatPipelineError::SourceIo {
            source_name: self.config.source_name.clone(),
            reason: e.to_string(),
        }
    }

    /// 지금까지 수집한 라인 수를 반환합니다.
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// 감시 중인 파일 경로를 반환합니다.
    pub fn path(&self) -> &std::path::Path {
        &self.config.path
    }

    /// 현재 상태를 반환합니다.
    pub fn status(&self) -> &CollectorStatus {
        &self.status
    }
}

fn strip_line_ending(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}

#[cfg(unix)]
fn file_id(meta: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn file_id(_meta: &std::fs::Metadata) -> Option<u64> {
    None
}
