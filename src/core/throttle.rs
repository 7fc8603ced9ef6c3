use std::time::{Duration, Instant};

use crate::core::stream::StreamChunk;

pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(50);

/// Rate limit for forwarding chunks downstream.
///
/// An intermediate chunk is forwarded only when at least `min_interval` has
/// passed since the last forwarded chunk. The terminal chunk always passes.
/// Chunks carry cumulative content, so a withheld chunk is superseded by the
/// next forwarded one.
#[derive(Debug, Clone)]
pub struct StreamThrottle {
    min_interval: Duration,
    last_forwarded: Option<Instant>,
    withheld: u64,
}

impl Default for StreamThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_INTERVAL)
    }
}

impl StreamThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_forwarded: None,
            withheld: 0,
        }
    }

    pub fn withheld(&self) -> u64 {
        self.withheld
    }

    pub fn admit(&mut self, chunk: &StreamChunk, now: Instant) -> bool {
        let due = self
            .last_forwarded
            .is_none_or(|last| now.saturating_duration_since(last) >= self.min_interval);

        if chunk.is_terminal() || due {
            self.last_forwarded = Some(now);
            true
        } else {
            self.withheld += 1;
            false
        }
    }

    pub fn admit_now(&mut self, chunk: &StreamChunk) -> bool {
        self.admit(chunk, Instant::now())
    }
}
