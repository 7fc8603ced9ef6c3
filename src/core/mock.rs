//! Offline stand-in for a model backend.
//!
//! Picks a canned reply from keywords in the latest user message and plays it
//! back word by word with a jittered delay, each chunk carrying the text so
//! far. Category selection is deterministic; only pacing is random.

use std::time::Duration;

use futures_util::stream::{self, BoxStream, StreamExt};

use crate::core::message::Message;
use crate::core::stream::StreamChunk;

pub const MOCK_MODELS: &[&str] = &["mock-general", "mock-codegen"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCategory {
    Code,
    Documentation,
    Planning,
    General,
}

const CODE_KEYWORDS: &[&str] = &["code", "function", "component", "compile", "refactor", "bug"];
const DOC_KEYWORDS: &[&str] = &["document", "readme", "docs"];
const PLAN_KEYWORDS: &[&str] = &["plan", "roadmap", "steps", "milestone"];

const CODE_RESPONSE: &str = "Happy to help with the code. Here is a shape that usually holds up:

```rust
pub struct Handler {
    retries: u32,
}

impl Handler {
    pub fn run(&self, input: &str) -> Result<String, String> {
        if input.is_empty() {
            return Err(\"empty input\".into());
        }
        Ok(input.trim().to_string())
    }
}
```

Validate inputs at the edge, return errors instead of panicking, and keep the happy path short. Want me to add tests for it?";

const DOC_RESPONSE: &str = "Let's put together documentation people will actually read.

## Overview

One paragraph on what the project does and who it is for.

## Getting started

```bash
cargo install --path .
```

## Usage

Show the two or three commands people run most, with real output.

## Reference

List every public entry point with its arguments and failure modes.

Which section should we flesh out first?";

const PLAN_RESPONSE: &str = "Here is a plan we can refine together.

1. Pin down the outcome and how we will know it is done.
2. Split the work into pieces that can each ship on their own.
3. Put the riskiest piece first so surprises show up early.
4. Review after each piece and adjust the rest of the plan.

Shall I turn any of these into concrete tasks?";

const GENERAL_RESPONSE: &str = "I understand the request. Let me work through it step by step.

First, I will look at the requirements and the constraints around them. Then I will compare a couple of approaches and pick the one with the fewest moving parts.

A few things to keep in mind along the way:

- Handle errors where they happen and report them clearly.
- Test the behaviour you care about, not the implementation.
- Write down the decisions you make and why they were made.

What would you like to focus on next?";

impl ResponseCategory {
    pub fn classify(input: &str) -> Self {
        let lower = input.to_lowercase();
        let mentions = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

        if mentions(CODE_KEYWORDS) {
            ResponseCategory::Code
        } else if mentions(DOC_KEYWORDS) {
            ResponseCategory::Documentation
        } else if mentions(PLAN_KEYWORDS) {
            ResponseCategory::Planning
        } else {
            ResponseCategory::General
        }
    }

    pub fn canned_text(self) -> &'static str {
        match self {
            ResponseCategory::Code => CODE_RESPONSE,
            ResponseCategory::Documentation => DOC_RESPONSE,
            ResponseCategory::Planning => PLAN_RESPONSE,
            ResponseCategory::General => GENERAL_RESPONSE,
        }
    }
}

/// Bounds for the delay between emitted words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockPacing {
    pub min: Duration,
    pub max: Duration,
}

impl Default for MockPacing {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(50),
            max: Duration::from_millis(150),
        }
    }
}

impl MockPacing {
    pub fn instant() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn next_delay(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let span = (self.max - self.min).as_millis() as u64;
        let mut bytes = [0u8; 8];
        match getrandom::fill(&mut bytes) {
            Ok(()) => self.min + Duration::from_millis(u64::from_le_bytes(bytes) % (span + 1)),
            Err(_) => self.min,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockGenerator {
    pacing: MockPacing,
}

struct Playback {
    id: String,
    words: Vec<&'static str>,
    next: usize,
    content: String,
    pacing: MockPacing,
    finished: bool,
}

impl MockGenerator {
    pub fn new(pacing: MockPacing) -> Self {
        Self { pacing }
    }

    pub fn pacing(&self) -> MockPacing {
        self.pacing
    }

    pub fn select(history: &[Message]) -> ResponseCategory {
        let last_user = history
            .iter()
            .rev()
            .find(|m| m.is_user())
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        ResponseCategory::classify(last_user)
    }

    pub fn stream(&self, message_id: &str, history: &[Message]) -> BoxStream<'static, StreamChunk> {
        let text = Self::select(history).canned_text();
        let playback = Playback {
            id: message_id.to_string(),
            words: text.split(' ').collect(),
            next: 0,
            content: String::with_capacity(text.len()),
            pacing: self.pacing,
            finished: false,
        };

        stream::unfold(playback, |mut state| async move {
            if state.finished {
                return None;
            }
            if state.next > 0 {
                pause(state.pacing.next_delay()).await;
            }
            if let Some(word) = state.words.get(state.next) {
                if state.next > 0 {
                    state.content.push(' ');
                }
                state.content.push_str(word);
                state.next += 1;
                let chunk = StreamChunk::partial(state.id.clone(), state.content.clone());
                return Some((chunk, state));
            }
            state.finished = true;
            let chunk = StreamChunk::finished(state.id.clone(), state.content.clone());
            Some((chunk, state))
        })
        .boxed()
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
