//! The interactive question loop.

use crate::ui;
use anyhow::Result;
use nl2sql::Nl2SqlAgent;
use std::io::Write;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tracing::warn;

/// What to do with one line of input.
#[derive(Debug, PartialEq, Eq)]
pub enum LineAction<'a> {
    Exit,
    Skip,
    ListSessions,
    Reset,
    Ask(&'a str),
}

pub fn classify(line: &str) -> LineAction<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineAction::Skip;
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "exit" | "quit" | "q" => LineAction::Exit,
        "sessions" => LineAction::ListSessions,
        "reset" => LineAction::Reset,
        _ => LineAction::Ask(trimmed),
    }
}

/// Reads questions from stdin until `exit` or end of input.
///
/// Errors from a single question are printed and the loop continues.
pub async fn run(agent: &Nl2SqlAgent) -> Result<()> {
    ui::print_banner(agent);
    let mut lines = BufReader::new(stdin()).lines();

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!("\n\nGoodbye!");
            break;
        };
        match classify(&line) {
            LineAction::Exit => {
                println!("\nGoodbye!");
                break;
            }
            LineAction::Skip => continue,
            LineAction::ListSessions => {
                let session = agent.session_config();
                let sessions = agent
                    .sessions()
                    .list_sessions(&session.app_name, &session.user_id)
                    .await;
                ui::print_sessions(&sessions, &session.session_id);
            }
            LineAction::Reset => match agent.reset_session().await {
                Ok(()) => println!("\nConversation cleared.\n"),
                Err(e) => println!("\nError: {e}\n"),
            },
            LineAction::Ask(question) => {
                ui::print_question(question);
                match agent.answer(question).await {
                    Ok(response) => ui::print_response(&response),
                    Err(e) => {
                        warn!("Question failed: {e}");
                        println!("\nError: {e}\n");
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_words_end_the_loop() {
        for word in ["exit", "quit", "q", "  QUIT  "] {
            assert_eq!(classify(word), LineAction::Exit);
        }
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(classify(""), LineAction::Skip);
        assert_eq!(classify("   \t"), LineAction::Skip);
    }

    #[test]
    fn session_commands_are_recognized() {
        assert_eq!(classify(" sessions "), LineAction::ListSessions);
        assert_eq!(classify("RESET"), LineAction::Reset);
        assert_eq!(classify("reset the numbers"), LineAction::Ask("reset the numbers"));
    }

    #[test]
    fn questions_are_trimmed() {
        assert_eq!(
            classify("  How many rows are there?\n"),
            LineAction::Ask("How many rows are there?")
        );
        assert_eq!(classify("quitting time?"), LineAction::Ask("quitting time?"));
    }
}
