use std::io::{self, BufRead, Write};

use uuid::Uuid;

use trestle_agent::BrokerRequest;
use trestle_core::chat::ChatMessage;

use super::{build_broker, CommandResult};

/// Interactive broker session. History accumulates for the lifetime of the
/// session and is replayed to the broker on every turn; all turns share one
/// conversation id so audit events correlate.
pub fn run(namespace: Option<String>) -> CommandResult {
    let handle = match build_broker("chat") {
        Ok(handle) => handle,
        Err(result) => return result,
    };

    let session_id = Uuid::new_v4().to_string();
    let effective = namespace.clone().unwrap_or_else(|| handle.default_namespace.clone());
    println!("trestle chat, namespace {effective}. Type 'exit' to end the session.");

    let mut history: Vec<ChatMessage> = Vec::new();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("you> ");
        if io::stdout().flush().is_err() {
            break;
        }
        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(_)) | None => break,
        };
        let text = match parse_repl_input(&line) {
            ReplInput::Quit => break,
            ReplInput::Empty => continue,
            ReplInput::Message(text) => text,
        };

        let mut request = BrokerRequest::new(text.clone()).with_history(history.clone());
        request.namespace = namespace.clone();
        request.conversation_id = Some(session_id.clone());
        let response = handle.runtime.block_on(handle.broker.handle(request));

        println!("trestle> {}\n", response.reply);
        history.push(ChatMessage::user(text));
        history.push(ChatMessage::assistant(response.reply));
    }

    CommandResult { exit_code: 0, output: String::new() }
}

#[derive(Debug, PartialEq)]
enum ReplInput {
    Quit,
    Empty,
    Message(String),
}

fn parse_repl_input(line: &str) -> ReplInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ReplInput::Empty;
    }
    if matches!(trimmed.to_ascii_lowercase().as_str(), "exit" | "quit") {
        return ReplInput::Quit;
    }
    ReplInput::Message(trimmed.to_string())
}
