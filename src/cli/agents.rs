use std::error::Error;

use crate::core::session::ChatSession;

pub async fn list_agents(session: &ChatSession, with_models: bool) -> Result<(), Box<dyn Error>> {
    let adapter = session.adapter();
    println!("Provider: {}", adapter.kind());
    println!();
    println!("Agents:");
    for agent in session.store().agent_configs() {
        let status = if agent.enabled { "" } else { " (disabled)" };
        println!("  {:<10} {:<24} {}{}", agent.id, agent.model, agent.name, status);
        if !agent.description.is_empty() {
            println!("  {:<10} {}", "", agent.description);
        }
    }

    if with_models {
        println!();
        match adapter.list_models().await {
            Ok(models) if models.is_empty() => println!("The backend reports no models."),
            Ok(models) => {
                println!("Available models:");
                for model in models {
                    println!("  {model}");
                }
            }
            Err(err) => {
                eprintln!("❌ Could not list models: {err}");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
