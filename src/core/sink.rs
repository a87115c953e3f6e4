//! Output channels back to the person driving a session.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};

#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Delivers one complete piece of text. An `Err` means the caller is gone.
    async fn send_text(&self, text: &str) -> Result<(), String>;
}

/// Writes each message followed by a blank line, as a terminal transcript.
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl WriterSink<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> OutputSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send_text(&self, text: &str) -> Result<(), String> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(format!("{text}\n\n").as_bytes())
            .await
            .map_err(|err| err.to_string())?;
        writer.flush().await.map_err(|err| err.to_string())
    }
}

/// Forwards messages to a receiver, for embedding a session in another loop.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl OutputSink for ChannelSink {
    async fn send_text(&self, text: &str) -> Result<(), String> {
        self.tx
            .send(text.to_string())
            .map_err(|_| "Output channel closed.".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_reports_closed_receiver() {
        let (sink, rx) = ChannelSink::new();
        sink.send_text("hello").await.expect("open channel");
        drop(rx);
        assert_eq!(
            sink.send_text("again").await,
            Err("Output channel closed.".to_string())
        );
    }

    #[tokio::test]
    async fn writer_sink_separates_messages() {
        let sink = WriterSink::new(Vec::new());
        sink.send_text("one").await.expect("write");
        sink.send_text("two").await.expect("write");
        let written = sink.writer.into_inner();
        assert_eq!(String::from_utf8(written).expect("utf8"), "one\n\ntwo\n\n");
    }
}
