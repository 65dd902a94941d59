//! Translation of Ollama's newline-delimited JSON stream into outward events.
//!
//! The backend writes one JSON object per line. Each line may carry a content
//! fragment under `message.content`, a `done` flag, or an in-band `error`.
//! Every translated stream ends with exactly one terminal event: either
//! [`StreamEvent::Done`] or [`StreamEvent::Error`].

use std::collections::VecDeque;

use futures::stream::{self, Stream, StreamExt};
use log::{debug, warn};
use serde_json::{json, Value};

use crate::error::ProxyError;

/// One outward streaming event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Content(String),
    Done,
    Error(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Content(_))
    }

    pub fn to_json(&self) -> Value {
        match self {
            StreamEvent::Content(text) => json!({ "content": text }),
            StreamEvent::Done => json!({ "done": true }),
            StreamEvent::Error(message) => json!({ "error": message }),
        }
    }

    /// `data: <json>` followed by a blank line.
    pub fn to_sse_frame(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Streaming,
    Done,
}

/// Line-at-a-time state machine for a single backend stream.
#[derive(Debug)]
pub struct StreamTranslator {
    state: State,
    buffer: Vec<u8>,
}

impl Default for StreamTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamTranslator {
    pub fn new() -> Self {
        Self {
            state: State::Start,
            buffer: Vec::new(),
        }
    }

    /// True once a terminal event has been produced.
    pub fn is_finished(&self) -> bool {
        self.state == State::Done
    }

    /// Accept a chunk of body bytes and translate every line it completes.
    ///
    /// Bytes arriving after the terminal event are discarded.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.is_finished() {
            return events;
        }
        if self.state == State::Start && !chunk.is_empty() {
            self.state = State::Streaming;
        }

        // Leftover bytes never contain a newline, so scanning starts at the new chunk.
        let mut scan = self.buffer.len();
        let mut start = 0;
        self.buffer.extend_from_slice(chunk);
        while let Some(offset) = self.buffer[scan..].iter().position(|b| *b == b'\n') {
            let end = scan + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = end + 1;
            scan = start;
            events.extend(self.translate_line(&line));
            if self.is_finished() {
                self.buffer.clear();
                return events;
            }
        }
        self.buffer.drain(..start);
        events
    }

    /// Translate one complete line.
    pub fn translate_line(&mut self, line: &str) -> Vec<StreamEvent> {
        let line = line.trim();
        if line.is_empty() || self.is_finished() {
            return Vec::new();
        }
        self.state = State::Streaming;

        let chunk: Value = match serde_json::from_str(line) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Skipping unparsable stream line ({}): {}", e, line);
                return Vec::new();
            }
        };

        // Fields are read one by one; a field of an unexpected type counts as absent.
        match chunk.get("error") {
            None | Some(Value::Null) => {}
            Some(error) => {
                let error = error.as_str().map_or_else(|| error.to_string(), str::to_string);
                self.state = State::Done;
                return vec![StreamEvent::Error(ProxyError::upstream(500, &error).to_string())];
            }
        }

        let mut events = Vec::new();
        if let Some(text) = chunk.pointer("/message/content").and_then(Value::as_str) {
            if !text.is_empty() {
                events.push(StreamEvent::Content(text.to_string()));
            }
        }
        if chunk.get("done").and_then(Value::as_bool).unwrap_or(false) {
            debug!("Ollama signalled completion");
            self.state = State::Done;
            events.push(StreamEvent::Done);
        }
        events
    }

    /// The body ended. Flush a trailing unterminated line, then make sure the
    /// stream is terminated.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.is_finished() {
            return Vec::new();
        }
        let trailing = std::mem::take(&mut self.buffer);
        let mut events = self.translate_line(&String::from_utf8_lossy(&trailing));
        if !self.is_finished() {
            let message = if self.state == State::Start {
                "Ollama closed the stream without sending any data"
            } else {
                "Ollama stream ended without a completion signal"
            };
            warn!("{}", message);
            self.state = State::Done;
            events.push(StreamEvent::Error(message.to_string()));
        }
        events
    }

    /// Transport failed mid-stream.
    pub fn fail(&mut self, err: &ProxyError) -> Option<StreamEvent> {
        if self.is_finished() {
            return None;
        }
        self.state = State::Done;
        self.buffer.clear();
        Some(StreamEvent::Error(err.to_string()))
    }
}

/// Drive a [`StreamTranslator`] over a backend body.
///
/// Reading stops at the first terminal event; the body is dropped with the
/// returned stream, which closes the backend connection.
pub fn translate<S, B>(body: S) -> impl Stream<Item = StreamEvent>
where
    S: Stream<Item = Result<B, ProxyError>>,
    B: AsRef<[u8]>,
{
    let initial = (Box::pin(body), StreamTranslator::new(), VecDeque::new());

    stream::unfold(initial, |(mut body, mut translator, mut queue)| async move {
        loop {
            if let Some(event) = queue.pop_front() {
                return Some((event, (body, translator, queue)));
            }
            if translator.is_finished() {
                return None;
            }
            match body.next().await {
                Some(Ok(chunk)) => queue.extend(translator.push_bytes(chunk.as_ref())),
                Some(Err(err)) => queue.extend(translator.fail(&err)),
                None => queue.extend(translator.finish()),
            }
        }
    })
}
