use std::time::Duration;

use super::{ChatMessage, ChatRequest, LlmError, StreamChunk};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAiStreamResponse {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

/// One decoded line of an SSE completion stream.
#[derive(Debug, PartialEq)]
enum StreamLine {
    Delta(String),
    Finished(Option<String>),
    Done,
    Skip,
}

fn parse_line(line: &str) -> StreamLine {
    let Some(data) = line.strip_prefix("data:") else {
        return StreamLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return StreamLine::Done;
    }
    let Ok(parsed) = serde_json::from_str::<OpenAiStreamResponse>(data) else {
        return StreamLine::Skip;
    };
    let Some(choice) = parsed.choices.into_iter().next() else {
        return StreamLine::Skip;
    };
    let content = choice.delta.content.filter(|c| !c.is_empty());
    match (content, choice.finish_reason) {
        (content, Some(_)) => StreamLine::Finished(content),
        (Some(content), None) => StreamLine::Delta(content),
        (None, None) => StreamLine::Skip,
    }
}

/// Splits a byte stream into lines. Bytes are only decoded once a full line
/// has arrived, so a character split across network chunks stays intact.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    fn next_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

pub async fn chat_stream(
    config: &OpenAiConfig,
    request: &ChatRequest,
    on_chunk: impl Fn(StreamChunk) + Send,
) -> Result<String, LlmError> {
    let client = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(config.timeout)
        .build()?;
    let body = OpenAiRequest {
        model: &request.model,
        messages: &request.messages,
        temperature: request.temperature,
        stream: true,
    };

    let mut req = client
        .post(format!("{}/chat/completions", config.base_url))
        .header("Content-Type", "application/json")
        .json(&body);

    if !config.api_key.is_empty() {
        req = req.header("Authorization", format!("Bearer {}", config.api_key));
    }

    let resp = req.send().await?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        return Err(LlmError::Api {
            status,
            message: text,
        });
    }

    let mut full_content = String::new();
    let mut stream = resp.bytes_stream();
    let mut lines = LineBuffer::default();

    while let Some(chunk) = stream.next().await {
        lines.extend(&chunk?);

        while let Some(line) = lines.next_line() {
            match parse_line(&line) {
                StreamLine::Delta(content) => {
                    full_content.push_str(&content);
                    on_chunk(StreamChunk { delta: content });
                }
                StreamLine::Finished(content) => {
                    if let Some(content) = content {
                        full_content.push_str(&content);
                        on_chunk(StreamChunk { delta: content });
                    }
                    return Ok(full_content);
                }
                StreamLine::Done => return Ok(full_content),
                StreamLine::Skip => {}
            }
        }
    }

    Ok(full_content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_line_yields_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        assert_eq!(parse_line(line), StreamLine::Delta("Hel".into()));
    }

    #[test]
    fn finish_reason_ends_stream() {
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_line(line), StreamLine::Finished(None));
    }

    #[test]
    fn done_marker_and_noise() {
        assert_eq!(parse_line("data: [DONE]"), StreamLine::Done);
        assert_eq!(parse_line(": keep-alive"), StreamLine::Skip);
        assert_eq!(parse_line("data: {not json"), StreamLine::Skip);
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"role":"assistant"},"finish_reason":null}]}"#),
            StreamLine::Skip
        );
    }

    #[test]
    fn request_body_carries_temperature_and_stream() {
        let messages = vec![ChatMessage::system("s"), ChatMessage::user("u")];
        let body = OpenAiRequest {
            model: "gemma2-9b-it",
            messages: &messages,
            temperature: 0.1,
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gemma2-9b-it");
        assert_eq!(json["stream"], true);
        assert!((json["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        assert_eq!(json["messages"][1]["role"], "user");
    }

    #[test]
    fn line_buffer_waits_for_complete_lines() {
        let mut lines = LineBuffer::default();
        lines.extend(b"data: caf\xC3");
        assert_eq!(lines.next_line(), None);
        lines.extend(b"\xA9\r\ndata: [DONE]\n");
        assert_eq!(lines.next_line().as_deref(), Some("data: café"));
        assert_eq!(lines.next_line().as_deref(), Some("data: [DONE]"));
        assert_eq!(lines.next_line(), None);
    }

    /// Serves a canned SSE body over raw TCP, one write per part, so chunk
    /// boundaries land exactly where the test puts them.
    async fn split_upstream(parts: Vec<Vec<u8>>) -> OpenAiConfig {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_ascii_lowercase();
                let complete = text.split_once("\r\n\r\n").is_some_and(|(head, body)| {
                    let length = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    body.len() >= length
                });
                if n == 0 || complete {
                    break;
                }
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            for part in parts {
                socket.write_all(&part).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });
        OpenAiConfig {
            api_key: String::new(),
            base_url: format!("http://{addr}"),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn multibyte_character_split_across_chunks_survives() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"},\"finish_reason\":null}]}\n\ndata: [DONE]\n\n";
        let bytes = line.as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let config = split_upstream(vec![bytes[..split].to_vec(), bytes[split..].to_vec()]).await;

        let request = ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            model: "m".into(),
            temperature: 0.1,
        };
        let deltas = std::sync::Mutex::new(Vec::new());
        let reply = chat_stream(&config, &request, |chunk| deltas.lock().unwrap().push(chunk.delta))
            .await
            .unwrap();

        assert_eq!(reply, "café");
        assert_eq!(*deltas.lock().unwrap(), vec!["café".to_string()]);
    }

    #[tokio::test]
    async fn silent_upstream_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        let config = OpenAiConfig {
            api_key: String::new(),
            base_url: format!("http://{addr}"),
            timeout: Duration::from_millis(200),
        };
        let request = ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            model: "m".into(),
            temperature: 0.1,
        };

        let err = chat_stream(&config, &request, |_| {}).await.unwrap_err();
        match err {
            LlmError::Http(e) => assert!(e.is_timeout(), "{e}"),
            other => panic!("unexpected error {other}"),
        }
    }
}
