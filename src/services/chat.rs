//! Streaming chat helper.
//!
//! [`ChatService`] talks to the provider and yields decoded chunks;
//! [`relay`] turns any such chunk stream into a bounded sequence of
//! [`RelayEvent`]s that always ends in exactly one terminal event.

use std::{
    collections::VecDeque,
    fmt::Display,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures::{stream::BoxStream, Stream, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use url::Url;

use crate::models::chat::{ChatChunk, ChatMessage};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("chat provider unreachable: {0}")]
    Transport(String),
    #[error("chat provider returned {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("invalid chunk from chat provider: {0}")]
    Decode(String),
}

/// One step of a relayed answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelayEvent {
    /// `seq` starts at 1 and grows by one per chunk.
    Text { seq: u64, text: String },
    Done,
    Error { message: String },
}

impl RelayEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayEvent::Text { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RelayOptions {
    /// Longest wait for the next upstream chunk before giving up.
    pub chunk_timeout: Duration,
    pub buffer: usize,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            chunk_timeout: Duration::from_secs(30),
            buffer: 32,
        }
    }
}

/// Stops a running relay. The consumer then sees a single `Error` event.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct RelayStream {
    rx: mpsc::Receiver<RelayEvent>,
}

impl RelayStream {
    pub async fn recv(&mut self) -> Option<RelayEvent> {
        self.rx.recv().await
    }
}

impl Stream for RelayStream {
    type Item = RelayEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

async fn aborted(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        // Handle dropped without aborting: never fire.
        futures::future::pending::<()>().await;
    }
}

pub fn relay<S, E>(upstream: S, options: RelayOptions) -> (RelayStream, AbortHandle)
where
    S: Stream<Item = Result<ChatChunk, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(options.buffer.max(1));
    let (abort_tx, abort_rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut upstream = Box::pin(upstream);
        let abort = aborted(abort_rx);
        tokio::pin!(abort);
        let mut seq = 0u64;

        let terminal = loop {
            let next = tokio::select! {
                _ = &mut abort => break RelayEvent::Error { message: "cancelled".into() },
                next = tokio::time::timeout(options.chunk_timeout, upstream.next()) => next,
            };
            match next {
                Err(_) => {
                    warn!(timeout = ?options.chunk_timeout, "chat upstream stalled");
                    break RelayEvent::Error {
                        message: "The assistant took too long to answer".into(),
                    };
                }
                Ok(None) => break RelayEvent::Done,
                Ok(Some(Err(err))) => {
                    warn!(error = %err, "chat upstream failed");
                    break RelayEvent::Error {
                        message: err.to_string(),
                    };
                }
                Ok(Some(Ok(chunk))) => {
                    if !chunk.content().is_empty() {
                        seq += 1;
                        let event = RelayEvent::Text {
                            seq,
                            text: chunk.content().to_string(),
                        };
                        if tx.send(event).await.is_err() {
                            debug!("chat consumer went away");
                            return;
                        }
                    }
                    if chunk.done {
                        break RelayEvent::Done;
                    }
                }
            }
        };
        let _ = tx.send(terminal).await;
    });

    (RelayStream { rx }, AbortHandle { tx: abort_tx })
}

/// Splits a byte stream into newline-delimited records.
#[derive(Default)]
struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(idx) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=idx).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buf).trim().to_string();
        self.buf.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

fn parse_line(line: &str) -> Result<ChatChunk, ChatError> {
    serde_json::from_str(line).map_err(|err| ChatError::Decode(err.to_string()))
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Clone)]
pub struct ChatService {
    url: Url,
    model: String,
    http: reqwest::Client,
    response_timeout: Duration,
}

impl ChatService {
    pub fn new(url: Url, model: impl Into<String>) -> Self {
        Self {
            url,
            model: model.into(),
            http: reqwest::Client::new(),
            response_timeout: RelayOptions::default().chunk_timeout,
        }
    }

    /// Longest wait for the provider's response headers.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub async fn stream(
        &self,
        messages: &[ChatMessage],
    ) -> Result<BoxStream<'static, Result<ChatChunk, ChatError>>, ChatError> {
        let request = self.http.post(self.url.clone()).json(&ChatRequest {
            model: &self.model,
            messages,
            stream: true,
        });
        let res = tokio::time::timeout(self.response_timeout, request.send())
            .await
            .map_err(|_| {
                warn!(timeout = ?self.response_timeout, "chat provider did not answer");
                ChatError::Transport(format!(
                    "no answer within {}s",
                    self.response_timeout.as_secs_f32()
                ))
            })?
            .map_err(|err| ChatError::Transport(err.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = tokio::time::timeout(self.response_timeout, res.text())
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default();
            return Err(ChatError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        Ok(decode_ndjson(res.bytes_stream()))
    }
}

struct DecodeState<S> {
    inner: Pin<Box<S>>,
    decoder: LineDecoder,
    pending: VecDeque<Result<ChatChunk, ChatError>>,
    finished: bool,
}

fn decode_ndjson<S, B, E>(bytes: S) -> BoxStream<'static, Result<ChatChunk, ChatError>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let state = DecodeState {
        inner: Box::pin(bytes),
        decoder: LineDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };
    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(bytes)) => {
                    let lines = st.decoder.push(bytes.as_ref());
                    st.pending.extend(lines.iter().map(|line| parse_line(line)));
                }
                Some(Err(err)) => {
                    st.finished = true;
                    st.pending
                        .push_back(Err(ChatError::Transport(err.to_string())));
                }
                None => {
                    st.finished = true;
                    if let Some(rest) = st.decoder.finish() {
                        st.pending.push_back(parse_line(&rest));
                    }
                }
            }
        }
    })
    .boxed()
}
