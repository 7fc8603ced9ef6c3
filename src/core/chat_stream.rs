use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::providers::{GenerationRequest, ProviderAdapter};
use crate::core::relay::{Relay, RelayReceiver};
use crate::core::throttle::StreamThrottle;

#[derive(Debug)]
pub struct StreamParams {
    pub request: GenerationRequest,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
}

/// Runs generations in the background and feeds their chunks, throttled,
/// into the relay.
#[derive(Clone)]
pub struct ChatStreamService {
    adapter: Arc<ProviderAdapter>,
    relay: Relay,
    throttle_interval: Duration,
}

impl ChatStreamService {
    pub fn new(
        adapter: Arc<ProviderAdapter>,
        throttle_interval: Duration,
    ) -> (Self, RelayReceiver) {
        let (relay, rx) = Relay::channel();
        (
            Self {
                adapter,
                relay,
                throttle_interval,
            },
            rx,
        )
    }

    pub fn adapter(&self) -> &Arc<ProviderAdapter> {
        &self.adapter
    }

    pub fn spawn_stream(&self, params: StreamParams) -> JoinHandle<()> {
        let adapter = Arc::clone(&self.adapter);
        let relay = self.relay.clone();
        let throttle = StreamThrottle::new(self.throttle_interval);
        tokio::spawn(run_stream(adapter, relay, throttle, params))
    }
}

async fn run_stream(
    adapter: Arc<ProviderAdapter>,
    relay: Relay,
    mut throttle: StreamThrottle,
    params: StreamParams,
) {
    let StreamParams {
        request,
        cancel_token,
        stream_id,
    } = params;
    let message_id = request.message_id.clone();

    tokio::select! {
        _ = async {
            let mut chunks = adapter.stream(request).await;
            while let Some(chunk) = chunks.next().await {
                let terminal = chunk.is_terminal();
                if throttle.admit_now(&chunk) && relay.forward(stream_id, chunk).is_err() {
                    debug!(stream_id, "Relay closed; abandoning stream");
                    return;
                }
                if terminal {
                    break;
                }
            }
            debug!(
                stream_id,
                message_id = %message_id,
                withheld = throttle.withheld(),
                "Stream settled"
            );
        } => {}
        _ = cancel_token.cancelled() => {
            debug!(stream_id, message_id = %message_id, "Stream cancelled");
        }
    }
}
