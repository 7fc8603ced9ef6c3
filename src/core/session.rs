//! A conversation store wired to a stream service.
//!
//! [`ChatSession`] is what a front end drives: it forwards sends to the
//! store, spawns the provider call the store asks for, and applies relayed
//! chunks back to the store, yielding one [`StoreUpdate`] per applied chunk.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::agent::AgentRegistry;
use crate::core::chat_stream::ChatStreamService;
use crate::core::config::Config;
use crate::core::mock::MockGenerator;
use crate::core::providers::ProviderAdapter;
use crate::core::relay::RelayReceiver;
use crate::core::store::{ConversationStore, StoreError, StoreUpdate};
use crate::utils::logging::TranscriptLog;

pub struct ChatSession {
    store: ConversationStore,
    service: ChatStreamService,
    relay_rx: RelayReceiver,
    task: Option<JoinHandle<()>>,
    transcript: TranscriptLog,
}

impl ChatSession {
    pub fn new(
        store: ConversationStore,
        service: ChatStreamService,
        relay_rx: RelayReceiver,
    ) -> Self {
        Self {
            store,
            service,
            relay_rx,
            task: None,
            transcript: TranscriptLog::disabled(),
        }
    }

    /// Build the store and provider stack described by `config`.
    pub fn from_config(config: &Config) -> Self {
        let mock = MockGenerator::new(config.mock_pacing());
        let settings = config.provider_settings();
        debug!(provider = settings.kind.id(), base_url = %settings.base_url, "Selected provider");

        let adapter = Arc::new(ProviderAdapter::from_settings(
            &settings,
            mock,
            config.offline_fallback(),
        ));
        let store = ConversationStore::new(AgentRegistry::with_overrides(&config.agents))
            .with_model_override(config.provider.model.clone());
        let (service, relay_rx) = ChatStreamService::new(adapter, config.throttle_interval());
        Self::new(store, service, relay_rx)
    }

    pub fn with_transcript(mut self, transcript: TranscriptLog) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    pub fn transcript_mut(&mut self) -> &mut TranscriptLog {
        &mut self.transcript
    }

    pub fn adapter(&self) -> &Arc<ProviderAdapter> {
        self.service.adapter()
    }

    pub fn is_streaming(&self) -> bool {
        self.store.is_streaming()
    }

    /// Send `content` in the active conversation and start generating the
    /// reply. Returns the id of the agent message being streamed.
    pub fn send_message(
        &mut self,
        content: &str,
        agent_id: Option<&str>,
    ) -> Result<String, StoreError> {
        let params = self.store.send_message(content, agent_id)?;
        let message_id = params.request.message_id.clone();
        if let Some(user) = self
            .store
            .active_conversation()
            .and_then(|c| c.messages.iter().rev().find(|m| m.is_user()))
        {
            self.log(user);
        }
        self.task = Some(self.service.spawn_stream(params));
        Ok(message_id)
    }

    /// Stop the current generation, keeping what has arrived.
    pub fn cancel(&mut self) -> bool {
        let cancelled = self.store.cancel_stream();
        if cancelled {
            self.task = None;
        }
        cancelled
    }

    /// Apply every envelope already waiting in the relay without blocking.
    pub fn process_pending(&mut self) -> Vec<StoreUpdate> {
        let mut updates = Vec::new();
        while let Some(envelope) = self.relay_rx.try_recv() {
            let update = self.store.apply_envelope(envelope);
            if update != StoreUpdate::Ignored {
                self.after_update(&update);
                updates.push(update);
            }
        }
        updates
    }

    /// Wait for the next update of the current stream. Returns `None` once
    /// nothing is streaming.
    pub async fn next_update(&mut self) -> Option<StoreUpdate> {
        loop {
            if !self.store.is_streaming() {
                return None;
            }

            let envelope = match self.task.as_mut() {
                Some(task) => {
                    tokio::select! {
                        biased;
                        envelope = self.relay_rx.recv() => envelope,
                        joined = task => {
                            self.task = None;
                            if let Err(err) = joined {
                                warn!(error = %err, "Stream task ended abnormally");
                            }
                            // Anything the task sent before exiting is
                            // already queued.
                            match self.relay_rx.try_recv() {
                                Some(envelope) => Some(envelope),
                                None => {
                                    const STOPPED: &str =
                                        "the response stream stopped before finishing";
                                    let update = self.store.fail_stream(STOPPED);
                                    self.after_update(&update);
                                    return Some(update);
                                }
                            }
                        }
                    }
                }
                None => self.relay_rx.recv().await,
            };

            let Some(envelope) = envelope else {
                let update = self.store.fail_stream("the response relay closed");
                self.after_update(&update);
                return Some(update);
            };

            let update = self.store.apply_envelope(envelope);
            if update != StoreUpdate::Ignored {
                self.after_update(&update);
                return Some(update);
            }
        }
    }

    /// Drive the current stream to completion, collecting every update.
    pub async fn run_until_settled(&mut self) -> Vec<StoreUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = self.next_update().await {
            updates.push(update);
        }
        updates
    }

    fn after_update(&mut self, update: &StoreUpdate) {
        let message_id = match update {
            StoreUpdate::Settled { message_id, .. } | StoreUpdate::Failed { message_id, .. } => {
                message_id
            }
            _ => return,
        };
        self.task = None;

        let Some(conversation) = self.store.active_conversation() else {
            return;
        };
        let Some(position) = conversation.messages.iter().position(|m| &m.id == message_id) else {
            return;
        };
        let settled = &conversation.messages[position..];
        if let Err(err) = self.transcript.log_messages(settled) {
            warn!(error = %err, "Failed to write transcript");
        }
    }

    fn log(&self, message: &crate::core::message::Message) {
        if let Err(err) = self.transcript.log_message(message) {
            warn!(error = %err, "Failed to write transcript");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Role;
    use crate::core::mock::{MockPacing, ResponseCategory};
    use crate::core::stream::StreamChunk;
    use std::time::Duration;

    fn mock_session(pacing: MockPacing, throttle: Duration) -> ChatSession {
        let adapter = Arc::new(ProviderAdapter::mock(MockGenerator::new(pacing)));
        let (service, rx) = ChatStreamService::new(adapter, throttle);
        ChatSession::new(ConversationStore::new(AgentRegistry::builtin()), service, rx)
    }

    #[tokio::test]
    async fn round_trip_creates_two_messages_and_clears_flag() {
        let mut session = mock_session(MockPacing::instant(), Duration::from_millis(50));
        session.store_mut().create_conversation("coder", None).unwrap();
        let message_id = session.send_message("hello", None).unwrap();
        assert!(session.is_streaming());

        let updates = session.run_until_settled().await;
        assert!(matches!(updates.last(), Some(StoreUpdate::Settled { .. })));
        assert!(!session.is_streaming());

        let conversation = session.store().active_conversation().unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(conversation.messages[1].role, Role::Agent);
        assert_eq!(conversation.messages[1].id, message_id);
        assert_eq!(
            conversation.messages[1].content,
            ResponseCategory::General.canned_text()
        );

        // Rendered deltas rebuild the final text exactly.
        let rendered: String = updates
            .iter()
            .filter_map(|u| match u {
                StoreUpdate::Appended { content, .. } | StoreUpdate::Settled { content, .. } => {
                    Some(content.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(rendered, conversation.messages[1].content);
    }

    #[tokio::test]
    async fn send_while_streaming_is_rejected() {
        let mut session = mock_session(MockPacing::instant(), Duration::ZERO);
        session.store_mut().create_conversation("coder", None).unwrap();
        session.send_message("hello", None).unwrap();

        assert_eq!(
            session.send_message("again", None),
            Err(StoreError::StreamInProgress)
        );
        session.run_until_settled().await;
        assert!(session.send_message("again", None).is_ok());
        session.run_until_settled().await;
        assert_eq!(
            session.store().active_conversation().unwrap().messages.len(),
            4
        );
    }

    #[tokio::test]
    async fn cancel_releases_flag_immediately_and_keeps_partial_text() {
        let pacing = MockPacing {
            min: Duration::from_millis(100),
            max: Duration::from_millis(100),
        };
        let mut session = mock_session(pacing, Duration::ZERO);
        session.store_mut().create_conversation("planner", None).unwrap();
        let message_id = session.send_message("make a plan", None).unwrap();

        let first = session.next_update().await.expect("first chunk");
        assert!(matches!(first, StoreUpdate::Appended { .. }));
        assert!(session.cancel());
        assert!(!session.is_streaming());
        assert_eq!(session.next_update().await, None);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(session.process_pending().is_empty());

        let conversation = session.store().active_conversation().unwrap();
        let message = conversation.message(&message_id).unwrap();
        assert!(!message.content.is_empty());
        assert!(ResponseCategory::Planning
            .canned_text()
            .starts_with(&message.content));
        assert_eq!(conversation.messages.len(), 2);
    }

    #[tokio::test]
    async fn unreachable_backend_surfaces_system_message() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config: Config = toml::from_str(&format!(
            "[provider]\nkind = \"ollama\"\nbase_url = \"http://{addr}\"\n"
        ))
        .unwrap();
        let mut session = ChatSession::from_config(&config);
        session.store_mut().create_conversation("coder", None).unwrap();
        session.send_message("hello", None).unwrap();

        let updates = session.run_until_settled().await;
        assert!(matches!(updates.last(), Some(StoreUpdate::Failed { .. })));
        assert!(!session.is_streaming());

        let conversation = session.store().active_conversation().unwrap();
        assert_eq!(conversation.messages.len(), 3);
        assert!(conversation.messages[1].content.is_empty());
        assert_eq!(conversation.messages[2].role, Role::System);
        assert!(conversation.messages[2].content.starts_with("Error: "));
    }

    #[tokio::test]
    async fn from_config_defaults_to_mock_backend() {
        let config: Config = toml::from_str(
            "[mock]\nmin_delay_ms = 0\nmax_delay_ms = 0\n[streaming]\nthrottle_ms = 0\n",
        )
        .unwrap();
        let mut session = ChatSession::from_config(&config);
        assert_eq!(
            session.adapter().kind(),
            crate::core::providers::ProviderKind::Mock
        );

        session.store_mut().create_conversation("coder", None).unwrap();
        session.send_message("refactor this function", None).unwrap();
        session.run_until_settled().await;
        let conversation = session.store().active_conversation().unwrap();
        assert_eq!(
            conversation.messages[1].content,
            ResponseCategory::Code.canned_text()
        );
    }

    #[tokio::test]
    async fn stale_envelopes_are_skipped_while_waiting() {
        let mut session = mock_session(MockPacing::instant(), Duration::ZERO);
        session.store_mut().create_conversation("coder", None).unwrap();
        session.send_message("first", None).unwrap();
        session.cancel();
        let message_id = session.send_message("second", None).unwrap();

        // Forge a late chunk from the cancelled stream ahead of the real ones.
        let forged = StreamChunk::finished(message_id.clone(), "forged");
        let stale = crate::core::relay::Envelope::chunk(1, forged);
        assert_eq!(session.store_mut().apply_envelope(stale), StoreUpdate::Ignored);

        session.run_until_settled().await;
        let conversation = session.store().active_conversation().unwrap();
        assert_eq!(
            conversation.message(&message_id).unwrap().content,
            ResponseCategory::General.canned_text()
        );
    }
}
