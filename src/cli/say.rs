//! One-shot "say" command

use std::error::Error;

use crate::cli::render_update;
use crate::core::session::ChatSession;
use crate::core::store::StoreUpdate;

pub async fn run_say(
    mut session: ChatSession,
    agent_id: &str,
    prompt: &[String],
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: arcdesk say <prompt>");
        std::process::exit(1);
    }

    session.store_mut().create_conversation(agent_id, None)?;
    session.send_message(&prompt, None)?;

    let mut failed = false;
    while let Some(update) = session.next_update().await {
        failed |= matches!(update, StoreUpdate::Failed { .. });
        render_update(&update)?;
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
