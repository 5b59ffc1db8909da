//! Handlers for `nl2sql engines ...`: agents deployed on Agent Engine.

use crate::ui;
use anyhow::Result;
use nl2sql::engine::AgentEngineClient;
use tracing::info;

pub async fn list(client: &AgentEngineClient) -> Result<()> {
    let engines = client.list().await?;

    println!("\n{}", "=".repeat(80));
    println!("DEPLOYED AGENT ENGINES");
    println!("{}\n", "=".repeat(80));

    if engines.is_empty() {
        println!("No deployed agents found.");
    }
    for (idx, engine) in engines.iter().enumerate() {
        println!("{}. {}", idx + 1, engine.label());
        println!("   Resource: {}\n", engine.name);
    }
    Ok(())
}

pub async fn get(client: &AgentEngineClient, resource: &str) -> Result<()> {
    let engine = client.get(resource).await?;
    println!("{}", serde_json::to_string_pretty(&engine)?);
    Ok(())
}

pub async fn sessions(client: &AgentEngineClient, resource: &str, user_id: &str) -> Result<()> {
    let sessions = client.list_sessions(resource, user_id).await?;
    ui::print_remote_sessions(user_id, &sessions);
    Ok(())
}

/// Opens a remote session and streams one question through the deployed agent.
pub async fn query(
    client: &AgentEngineClient,
    resource: &str,
    user_id: &str,
    question: &str,
) -> Result<()> {
    let session_id = client.create_session(resource, user_id).await?;
    println!("Session created: {session_id}\n");
    ui::print_question(question);

    let events = client
        .stream_query(resource, user_id, &session_id, question)
        .await?;
    info!(events = events.len(), "Remote query finished");
    for event in &events {
        ui::print_engine_event(event);
    }
    Ok(())
}
