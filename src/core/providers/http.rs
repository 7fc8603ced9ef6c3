//! Plumbing shared by the HTTP backends: sending the request, turning
//! failures into [`ProviderError`], and folding a decoded byte stream into
//! cumulative [`StreamChunk`]s.

use std::collections::VecDeque;
use std::error::Error;
use std::fmt::Display;

use futures_util::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{ChunkStream, ProviderError};
use crate::core::decoder::{ChunkDecoder, Frame};
use crate::core::stream::StreamChunk;

/// Text produced by one decoded record, before accumulation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Piece {
    pub text: String,
    pub done: bool,
    pub tokens: Option<u32>,
}

impl Piece {
    pub fn end(tokens: Option<u32>) -> Self {
        Self {
            done: true,
            tokens,
            ..Self::default()
        }
    }
}

fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = inner.source();
    }
    message
}

pub(crate) fn request_error(err: reqwest::Error) -> ProviderError {
    let message = error_chain(&err);
    if err.is_connect() {
        ProviderError::Unreachable(message)
    } else {
        ProviderError::Transport(message)
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value
                .get("error")
                .and_then(|v| v.as_str().map(str::to_owned))
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// One-line description of an error response body.
pub(crate) fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .as_ref()
        .and_then(extract_error_summary)
        .filter(|summary| !summary.is_empty())
        .unwrap_or_else(|| trimmed.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// POST a JSON body and hand back the response once its status is known to
/// be a success.
pub(crate) async fn send_json<B: Serialize + ?Sized>(
    request: reqwest::RequestBuilder,
    body: &B,
) -> Result<reqwest::Response, ProviderError> {
    let response = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(request_error)?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        return Err(ProviderError::Status {
            status: status.as_u16(),
            message: summarize_error_body(&body),
        });
    }

    Ok(response)
}

struct Accumulator<S, T> {
    id: String,
    body: std::pin::Pin<Box<S>>,
    decoder: ChunkDecoder<T>,
    normalize: fn(Frame<T>) -> Piece,
    pending: VecDeque<Piece>,
    content: String,
    tokens: Option<u32>,
    body_done: bool,
    finished: bool,
}

/// Decode a response body into cumulative chunks for `message_id`.
///
/// Exactly one terminal chunk is produced when the backend signals the end
/// of generation, or when the body closes cleanly after some output. A body
/// error, or a clean close with no output at all, ends the stream with an
/// error instead.
pub(crate) fn chunk_stream<S, B, E, T>(
    message_id: String,
    body: S,
    decoder: ChunkDecoder<T>,
    normalize: fn(Frame<T>) -> Piece,
) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
    T: DeserializeOwned + Send + 'static,
{
    let state = Accumulator {
        id: message_id,
        body: Box::pin(body),
        decoder,
        normalize,
        pending: VecDeque::new(),
        content: String::new(),
        tokens: None,
        body_done: false,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            if let Some(piece) = state.pending.pop_front() {
                state.content.push_str(&piece.text);
                if piece.tokens.is_some() {
                    state.tokens = piece.tokens;
                }
                if piece.done {
                    state.finished = true;
                    let chunk = StreamChunk::finished(state.id.clone(), state.content.clone())
                        .with_tokens(state.tokens);
                    return Some((Ok(chunk), state));
                }
                if piece.text.is_empty() {
                    continue;
                }
                let chunk = StreamChunk::partial(state.id.clone(), state.content.clone());
                return Some((Ok(chunk), state));
            }

            if state.body_done {
                state.finished = true;
                if state.content.is_empty() {
                    let err = ProviderError::Transport(
                        "response ended before any output was generated".to_string(),
                    );
                    return Some((Err(err), state));
                }
                let chunk = StreamChunk::finished(state.id.clone(), state.content.clone())
                    .with_tokens(state.tokens);
                return Some((Ok(chunk), state));
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let normalize = state.normalize;
                    let frames = state.decoder.push(bytes.as_ref());
                    state.pending.extend(frames.into_iter().map(normalize));
                }
                Some(Err(err)) => {
                    state.finished = true;
                    let err = ProviderError::Transport(format!("stream interrupted: {err}"));
                    return Some((Err(err), state));
                }
                None => {
                    let normalize = state.normalize;
                    let frames = state.decoder.finish();
                    state.pending.extend(frames.into_iter().map(normalize));
                    state.body_done = true;
                }
            }
        }
    })
    .boxed()
}
