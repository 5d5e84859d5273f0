//! Line-based transport over stdin/stdout for local runs

use super::{ChatId, ChatTransport, InboundEvent, Payload};
use crate::custody::UserId;
use crate::session::Reply;
use crate::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

const BUTTON_PREFIX: &str = "/btn ";

/// Classify one console line: `/btn <code>` presses a button, anything else is text
pub fn parse_line(line: &str) -> Option<Payload> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line == BUTTON_PREFIX.trim_end() {
        return Some(Payload::Unknown);
    }
    match line.strip_prefix(BUTTON_PREFIX) {
        Some(code) => Some(Payload::Action(code.trim().to_string())),
        None => Some(Payload::Text(line.to_string())),
    }
}

/// Render a reply the way a chat client would show it
pub fn render(reply: &Reply) -> String {
    let mut out = reply.text.clone();
    for row in &reply.keyboard {
        let buttons: Vec<String> = row
            .iter()
            .map(|b| format!("[{} | /btn {}]", b.label, b.action))
            .collect();
        out.push('\n');
        out.push_str(&buttons.join("  "));
    }
    out
}

/// Single-user console session; every line comes from the same user and chat
pub struct ConsoleTransport {
    user_id: UserId,
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl ConsoleTransport {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

#[async_trait]
impl ChatTransport for ConsoleTransport {
    async fn next_event(&self) -> Option<InboundEvent> {
        let mut lines = self.lines.lock().await;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(payload) = parse_line(&line) {
                        return Some(InboundEvent {
                            user_id: self.user_id,
                            chat_id: self.user_id,
                            payload,
                        });
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read console input");
                    return None;
                }
            }
        }
    }

    async fn send(&self, _chat_id: ChatId, reply: &Reply) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(render(reply).as_bytes()).await?;
        stdout.write_all(b"\n\n").await?;
        stdout.flush().await?;
        Ok(())
    }
}
