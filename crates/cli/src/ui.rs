//! # Console Output
//!
//! Everything the CLI prints to stdout. Logs go to stderr through `tracing`,
//! so stdout only carries what the user asked for.

use chrono::{DateTime, Utc};
use nl2sql::{
    engine::{EngineEvent, RemoteSession},
    session::Session,
    AgentResponse, Nl2SqlAgent, RuntimeIdentity,
};

const RULE_WIDTH: usize = 80;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

pub fn print_identity(identity: &RuntimeIdentity) {
    println!("✓ Project ID: {}", identity.project_id);
    println!("✓ Location: {}", identity.location);
}

pub fn print_agent(agent: &Nl2SqlAgent) {
    println!("✓ Agent '{}' initialized", agent.name());
    println!("✓ Model: {}", agent.model());
    println!("✓ Target table: {}", agent.toolset().target_table());
    println!("✓ Write mode: {}", agent.toolset().write_mode().as_str());
}

pub fn print_banner(agent: &Nl2SqlAgent) {
    println!("\n{}", rule());
    println!("  NL2SQL Agent - Interactive Mode");
    println!("{}", rule());
    println!("\nTable: {}", agent.toolset().target_table());
    println!("\nType 'sessions' to list sessions, 'reset' to start over");
    println!("Type 'exit' or 'quit' to end the session\n");
}

pub fn print_question(question: &str) {
    println!("\n{}", rule());
    println!("USER: {question}");
    println!("{}\n", rule());
}

pub fn print_sql(sql: &str) {
    println!("🔍 SQL QUERY EXECUTED:");
    println!("{}", rule());
    println!("{sql}");
    println!("{}\n", rule());
}

pub fn print_response(response: &AgentResponse) {
    for call in &response.tool_calls {
        if let Some(sql) = call.sql() {
            print_sql(sql);
            if call.failed {
                println!("(the query was rejected or failed; the agent was told why)\n");
            }
        }
    }
    println!("AGENT: {}\n", response.text);
}

pub fn print_engine_event(event: &EngineEvent) {
    for sql in &event.executed_sql {
        print_sql(sql);
    }
    for text in &event.text {
        println!("AGENT: {text}\n");
    }
}

pub fn print_sessions(sessions: &[Session], current: &str) {
    if sessions.is_empty() {
        println!("No sessions.\n");
        return;
    }
    for session in sessions {
        let marker = if session.id == current { "*" } else { " " };
        println!(
            "{marker} {} ({} messages, updated {})",
            session.id,
            session.history.len(),
            session.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!();
}

pub fn print_remote_sessions(user_id: &str, sessions: &[RemoteSession]) {
    println!("Sessions for {user_id}: {}\n", sessions.len());
    for session in sessions {
        let updated = session
            .last_update_time
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0))
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {}  (updated {updated})", session.id);
    }
}
