use super::*;
use crate::core::message::Role;

fn store() -> ConversationStore {
    ConversationStore::new(AgentRegistry::builtin())
}

fn streaming_store(text: &str) -> (ConversationStore, StreamParams) {
    let mut store = store();
    store.create_conversation("coder", None).unwrap();
    let params = store.send_message(text, None).unwrap();
    (store, params)
}

fn envelope(params: &StreamParams, content: &str, done: bool) -> Envelope {
    let id = params.request.message_id.clone();
    let chunk = if done {
        StreamChunk::finished(id, content)
    } else {
        StreamChunk::partial(id, content)
    };
    Envelope::chunk(params.stream_id, chunk)
}

fn agent_message<'a>(store: &'a ConversationStore, params: &StreamParams) -> &'a Message {
    store
        .active_conversation()
        .and_then(|c| c.message(&params.request.message_id))
        .expect("placeholder")
}

#[test]
fn create_conversation_inserts_at_head_and_activates() {
    let mut store = store();
    let first = store.create_conversation("coder", None).unwrap();
    let second = store
        .create_conversation("planner", Some("Sprint plan"))
        .unwrap();

    let ids: Vec<&str> = store.conversations().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![second.as_str(), first.as_str()]);
    assert_eq!(store.active_conversation().unwrap().id, second);
    assert_eq!(store.active_conversation().unwrap().title, "Sprint plan");
    assert_eq!(store.conversation(&first).unwrap().title, "Chat with Coder");
}

#[test]
fn create_conversation_rejects_unknown_agent() {
    let mut store = store();
    assert_eq!(
        store.create_conversation("ghost", None),
        Err(StoreError::UnknownAgent("ghost".into()))
    );
    assert!(store.conversations().is_empty());
    assert!(store.active_conversation().is_none());
}

#[test]
fn send_message_appends_pair_and_sets_flag() {
    let (store, params) = streaming_store("hello");
    let conversation = store.active_conversation().unwrap();

    assert_eq!(conversation.messages.len(), 2);
    let (user, agent) = (&conversation.messages[0], &conversation.messages[1]);
    assert_eq!(user.role, Role::User);
    assert_eq!(user.content, "hello");
    assert_eq!(agent.role, Role::Agent);
    assert!(agent.content.is_empty());
    assert_eq!(user.timestamp, agent.timestamp);
    assert_eq!(agent.agent_id.as_deref(), Some("coder"));

    assert_eq!(store.streaming_message_id(), Some(agent.id.as_str()));
    assert_eq!(params.request.message_id, agent.id);
    assert_eq!(params.request.model, "deepseek-coder:6.7b");
    // The placeholder is not part of the prompt.
    assert_eq!(params.request.history.len(), 1);
    assert_eq!(params.request.history[0].content, "hello");
}

#[test]
fn send_message_preconditions_leave_state_untouched() {
    let mut store = store();
    assert_eq!(
        store.send_message("hi", None).unwrap_err(),
        StoreError::NoActiveConversation
    );

    store.create_conversation("coder", None).unwrap();
    assert_eq!(
        store.send_message("   ", None).unwrap_err(),
        StoreError::EmptyMessage
    );
    assert!(matches!(
        store.send_message("hi", Some("planner")),
        Err(StoreError::AgentMismatch { .. })
    ));
    assert!(store.active_conversation().unwrap().messages.is_empty());
    assert!(!store.is_streaming());
}

#[test]
fn second_send_while_streaming_is_rejected_without_mutation() {
    let (mut store, params) = streaming_store("hello");
    let before = store.active_conversation().unwrap().messages.len();

    assert_eq!(
        store.send_message("again", None).unwrap_err(),
        StoreError::StreamInProgress
    );
    assert_eq!(store.active_conversation().unwrap().messages.len(), before);
    assert_eq!(
        store.streaming_message_id(),
        Some(params.request.message_id.as_str())
    );

    // Switching to another conversation does not open a second slot.
    store.create_conversation("planner", None).unwrap();
    assert_eq!(
        store.send_message("parallel", None).unwrap_err(),
        StoreError::StreamInProgress
    );
}

#[test]
fn cumulative_chunks_append_suffixes_and_settle() {
    let (mut store, params) = streaming_store("hello");

    let update = store.apply_envelope(envelope(&params, "Hi", false));
    assert_eq!(
        update,
        StoreUpdate::Appended {
            message_id: params.request.message_id.clone(),
            content: "Hi".into()
        }
    );
    store.apply_envelope(envelope(&params, "Hi the", false));
    let update = store.apply_envelope(envelope(&params, "Hi there", true));
    assert_eq!(
        update,
        StoreUpdate::Settled {
            message_id: params.request.message_id.clone(),
            content: "re".into()
        }
    );

    let message = agent_message(&store, &params);
    assert_eq!(message.content, "Hi there");
    let metadata = message.metadata.as_ref().expect("metadata");
    assert_eq!(metadata.model.as_deref(), Some("deepseek-coder:6.7b"));
    assert!(metadata.processing_time_ms.is_some());
    assert!(!store.is_streaming());

    let coder = store.agent_configs().iter().find(|a| a.id == "coder").unwrap();
    assert_eq!(coder.usage.total_messages, 1);
    assert_eq!(coder.usage.successful_messages, 1);
    assert!(coder.last_used.is_some());
}

#[test]
fn final_content_survives_any_withheld_subset() {
    let steps = ["A", "A b", "A b c", "A b c d", "A b c d e"];
    // Every subset of the intermediate chunks, terminal always delivered.
    for mask in 0u32..(1 << (steps.len() - 1)) {
        let (mut store, params) = streaming_store("hello");
        for (i, step) in steps[..steps.len() - 1].iter().enumerate() {
            if mask & (1 << i) != 0 {
                store.apply_envelope(envelope(&params, step, false));
            }
        }
        store.apply_envelope(envelope(&params, steps[steps.len() - 1], true));

        assert_eq!(agent_message(&store, &params).content, "A b c d e", "mask {mask:b}");
        assert!(!store.is_streaming());
    }
}

#[test]
fn non_extending_chunk_is_ignored() {
    let (mut store, params) = streaming_store("hello");
    store.apply_envelope(envelope(&params, "Hello", false));
    let update = store.apply_envelope(envelope(&params, "Help", false));
    assert_eq!(
        update,
        StoreUpdate::Appended {
            message_id: params.request.message_id.clone(),
            content: String::new()
        }
    );
    assert_eq!(agent_message(&store, &params).content, "Hello");
}

#[test]
fn error_chunk_appends_system_message_and_clears_flag() {
    let (mut store, params) = streaming_store("hello");
    store.apply_envelope(envelope(&params, "Par", false));

    let failed = StreamChunk::failed(params.request.message_id.clone(), "connection refused");
    let update = store.apply_envelope(Envelope::chunk(params.stream_id, failed));
    assert_eq!(
        update,
        StoreUpdate::Failed {
            message_id: params.request.message_id.clone(),
            error: "connection refused".into()
        }
    );

    let conversation = store.active_conversation().unwrap();
    assert_eq!(conversation.messages.len(), 3);
    assert_eq!(conversation.messages[1].content, "Par");
    let notice = &conversation.messages[2];
    assert_eq!(notice.role, Role::System);
    assert_eq!(notice.content, "Error: connection refused");
    assert!(!store.is_streaming());

    let coder = store.agent_configs().iter().find(|a| a.id == "coder").unwrap();
    assert_eq!(coder.usage.total_messages, 1);
    assert_eq!(coder.usage.successful_messages, 0);

    // The composer is usable again.
    assert!(store.send_message("retry", None).is_ok());
}

#[test]
fn cancel_keeps_partial_content_and_drops_late_chunks() {
    let (mut store, params) = streaming_store("hello");
    store.apply_envelope(envelope(&params, "Partial", false));

    assert!(store.cancel_stream());
    assert!(params.cancel_token.is_cancelled());
    assert!(!store.is_streaming());
    assert!(!store.cancel_stream());

    let late = store.apply_envelope(envelope(&params, "Partial answer", true));
    assert_eq!(late, StoreUpdate::Ignored);
    assert_eq!(agent_message(&store, &params).content, "Partial");
}

#[test]
fn envelopes_from_previous_streams_are_ignored() {
    let (mut store, first) = streaming_store("one");
    store.apply_envelope(envelope(&first, "done", true));
    let second = store.send_message("two", None).unwrap();
    assert!(second.stream_id > first.stream_id);

    let stale = Envelope::chunk(
        first.stream_id,
        StreamChunk::finished(second.request.message_id.clone(), "stale"),
    );
    assert_eq!(store.apply_envelope(stale), StoreUpdate::Ignored);
    assert!(store.is_streaming());
    assert!(agent_message(&store, &second).content.is_empty());
}

#[test]
fn second_turn_history_includes_first_exchange() {
    let (mut store, first) = streaming_store("one");
    store.apply_envelope(envelope(&first, "reply", true));
    let second = store.send_message("two", None).unwrap();

    let contents: Vec<&str> = second
        .request
        .history
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(contents, vec!["one", "reply", "two"]);
}

#[test]
fn failed_turn_leaves_no_empty_reply_in_next_history() {
    let (mut store, first) = streaming_store("one");
    let failed = StreamChunk::failed(first.request.message_id.clone(), "connection refused");
    store.apply_envelope(Envelope::chunk(first.stream_id, failed));

    let second = store.send_message("two", None).unwrap();
    assert!(second
        .request
        .history
        .iter()
        .all(|m| !(m.role == Role::Agent && m.content.is_empty())));
    let contents: Vec<&str> = second
        .request
        .history
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(contents, vec!["one", "two"]);
}

#[test]
fn overridden_builtin_agent_keeps_its_id() {
    let custom = AgentConfig {
        id: "Coder".into(),
        name: "Local Coder".into(),
        model: "qwen2.5-coder:7b".into(),
        description: String::new(),
        enabled: true,
        config: Default::default(),
        usage: Default::default(),
        last_used: None,
    };
    let mut store = ConversationStore::new(AgentRegistry::with_overrides(&[custom]));

    let id = store.create_conversation("coder", None).unwrap();
    assert_eq!(store.conversation(&id).unwrap().title, "Chat with Local Coder");
    let params = store.send_message("hello", None).unwrap();
    assert_eq!(params.request.model, "qwen2.5-coder:7b");
}

#[test]
fn delete_active_conversation_clears_pointer_and_stream() {
    let (mut store, params) = streaming_store("hello");
    let id = store.active_conversation().unwrap().id.clone();

    store.delete_conversation(&id).unwrap();
    assert!(store.active_conversation().is_none());
    assert!(store.conversations().is_empty());
    assert!(!store.is_streaming());
    assert!(params.cancel_token.is_cancelled());
    assert_eq!(
        store.delete_conversation(&id),
        Err(StoreError::UnknownConversation(id))
    );
}

#[test]
fn delete_inactive_conversation_keeps_pointer() {
    let mut store = store();
    let old = store.create_conversation("coder", None).unwrap();
    let current = store.create_conversation("planner", None).unwrap();

    store.delete_conversation(&old).unwrap();
    assert_eq!(store.active_conversation().unwrap().id, current);
}

#[test]
fn archive_and_complete_change_status() {
    let mut store = store();
    let id = store.create_conversation("coder", None).unwrap();

    store.archive_conversation(&id).unwrap();
    assert_eq!(
        store.conversation(&id).unwrap().status,
        ConversationStatus::Archived
    );
    store.complete_conversation(&id).unwrap();
    assert_eq!(
        store.conversation(&id).unwrap().status,
        ConversationStatus::Completed
    );
    assert!(store.archive_conversation("missing").is_err());
}

#[test]
fn set_active_conversation_validates_id() {
    let mut store = store();
    let id = store.create_conversation("coder", None).unwrap();

    store.set_active_conversation(None).unwrap();
    assert!(store.active_conversation().is_none());
    assert_eq!(
        store.set_active_conversation(Some("missing")),
        Err(StoreError::UnknownConversation("missing".into()))
    );
    store.set_active_conversation(Some(&id)).unwrap();
    assert_eq!(store.active_conversation().unwrap().id, id);
}

#[test]
fn update_agent_config_keeps_usage() {
    let (mut store, params) = streaming_store("hello");
    store.apply_envelope(envelope(&params, "ok", true));

    let mut coder = store
        .agent_configs()
        .iter()
        .find(|a| a.id == "coder")
        .unwrap()
        .clone();
    coder.model = "qwen2.5-coder:7b".into();
    coder.usage = Default::default();
    store.update_agent_config(coder).unwrap();

    let coder = store.agent_configs().iter().find(|a| a.id == "coder").unwrap();
    assert_eq!(coder.model, "qwen2.5-coder:7b");
    assert_eq!(coder.usage.total_messages, 1);

    let next = store.send_message("again", None).unwrap();
    assert_eq!(next.request.model, "qwen2.5-coder:7b");
}

#[test]
fn model_override_applies_to_every_agent() {
    let mut store = store().with_model_override(Some("phi3:mini".into()));
    store.create_conversation("planner", None).unwrap();
    let params = store.send_message("plan it", None).unwrap();
    assert_eq!(params.request.model, "phi3:mini");
}
