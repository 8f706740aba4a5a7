//! Telegram Bot API 전송 수단
//!
//! `POST {api_base}/bot{token}/sendMessage`에 `{"chat_id", "text"}`를 보냅니다.
//! 에러 메시지에 토큰이 섞이지 않도록 URL은 로그에 남기지 않습니다.
//! 응답하지 않는 연결에 묶이지 않도록 요청마다 타임아웃을 둡니다.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use chatguard_core::config::NotifierConfig;

use super::Notifier;
use crate::error::ChatPipelineError;

/// Telegram 전송 설정
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot API 베이스 URL
    pub api_base: String,
    /// 봇 토큰
    pub bot_token: String,
    /// 대상 채팅 ID
    pub chat_id: String,
    /// 요청 타임아웃 (연결부터 응답 본문까지)
    pub timeout: Duration,
}

impl TelegramConfig {
    /// core 설정에서 생성합니다.
    pub fn from_core(core: &NotifierConfig) -> Self {
        Self {
            api_base: core.api_base.clone(),
            bot_token: core.bot_token.clone(),
            chat_id: core.chat_id.clone(),
            timeout: Duration::from_secs(core.timeout_secs),
        }
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        )
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Telegram 전송 수단
pub struct TelegramNotifier {
    client: Client,
    url: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// 새 전송 수단을 생성합니다.
    pub fn new(config: TelegramConfig) -> Result<Self, ChatPipelineError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChatPipelineError::Notify(e.without_url().to_string()))?;
        Ok(Self {
            client,
            url: config.send_message_url(),
            chat_id: config.chat_id,
        })
    }
}

impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), ChatPipelineError> {
        let response = self
            .client
            .post(&self.url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .await
            .map_err(|e| ChatPipelineError::Notify(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatPipelineError::Notify(format!(
                "telegram returned status {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).into_owned();
                if let Some(end) = text.find("\r\n\r\n") {
                    let len = text[..end]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + len {
                        break;
                    }
                }
            }
            let response =
                format!("{status_line}\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{{}}");
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            String::from_utf8_lossy(&buf).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    fn config(api_base: String) -> TelegramConfig {
        TelegramConfig {
            api_base,
            bot_token: "123:abc".to_owned(),
            chat_id: "-100500".to_owned(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn url_contains_token_and_method() {
        let cfg = config("https://api.telegram.org/".to_owned());
        assert_eq!(
            cfg.send_message_url(),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[tokio::test]
    async fn send_posts_chat_id_and_text() {
        let (base, server) = serve_once("HTTP/1.1 200 OK").await;
        let notifier = TelegramNotifier::new(config(base)).unwrap();

        notifier.send("(глобальный) Bob: привет").await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /bot123:abc/sendMessage"));
        assert!(request.contains("\"chat_id\":\"-100500\""));
        assert!(request.contains("\"text\":\"(глобальный) Bob: привет\""));
    }

    #[test]
    fn timeout_comes_from_core_config() {
        let core = NotifierConfig {
            timeout_secs: 3,
            ..NotifierConfig::default()
        };
        assert_eq!(TelegramConfig::from_core(&core).timeout, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn unresponsive_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // 연결은 받지만 응답하지 않습니다.
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let notifier = TelegramNotifier::new(TelegramConfig {
            timeout: Duration::from_millis(200),
            ..config(format!("http://{addr}"))
        })
        .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), notifier.send("x")).await;
        let err = result
            .expect("send should give up on its own")
            .unwrap_err();
        assert!(matches!(err, ChatPipelineError::Notify(_)));
        server.abort();
    }

    #[tokio::test]
    async fn error_status_is_notify_error() {
        let (base, server) = serve_once("HTTP/1.1 403 Forbidden").await;
        let notifier = TelegramNotifier::new(config(base)).unwrap();

        let err = notifier.send("x").await.unwrap_err();
        assert!(matches!(err, ChatPipelineError::Notify(_)));
        assert!(err.to_string().contains("403"));
        server.await.unwrap();
    }
}
