//! Line-oriented terminal front-end.

use parley_core::{SessionControl, SessionError};
use parley_types::{InboundMessage, ServerEvent};

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    Assistant(String),
    Pause,
    Resume,
    Quit,
    Empty,
    Unknown(String),
}

/// Whether the input loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Say(line.to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    match name {
        "assistant" if !arg.is_empty() => Command::Assistant(arg.to_string()),
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(name.to_string()),
    }
}

/// Sends whatever `command` asks for.
pub fn execute(control: &SessionControl, command: Command) -> Result<Flow, SessionError> {
    match command {
        Command::Say(text) => control.send_user_input(text)?,
        Command::Assistant(text) => control.send_assistant_input(text)?,
        Command::Pause => control.pause_assistant()?,
        Command::Resume => control.resume_assistant()?,
        Command::Quit => return Ok(Flow::Quit),
        Command::Empty => {}
        Command::Unknown(name) => {
            eprintln!("unknown command /{} (try /assistant, /pause, /resume, /quit)", name)
        }
    }
    Ok(Flow::Continue)
}

/// A one-line rendering of an inbound message, prefixed with its
/// `receivedAt` stamp.
pub fn describe(message: &InboundMessage) -> String {
    let body = match &message.event {
        ServerEvent::AssistantMessage(msg) | ServerEvent::UserMessage(msg) => {
            let interim = if msg.interim { " (interim)" } else { "" };
            format!("{}{}: {}", msg.message.role, interim, msg.content())
        }
        ServerEvent::UserInterruption(_) => "user interrupted".to_string(),
        ServerEvent::Error(err) => format!("server error {}: {}", err.code, err.message),
        ServerEvent::ChatMetadata(meta) => format!("chat {}", meta.chat_id),
        ServerEvent::AssistantEnd(_) => "assistant finished".to_string(),
        ServerEvent::AudioOutput(audio) => {
            format!("audio {} ({} bytes base64)", audio.id, audio.data.len())
        }
        ServerEvent::ToolCall(call) => format!(
            "tool call {}: {}({})",
            call.tool_call_id, call.name, call.parameters
        ),
        ServerEvent::ToolResponse(resp) => {
            format!("tool response {}: {}", resp.tool_call_id, resp.content)
        }
        ServerEvent::ToolError(err) => format!(
            "tool error {} [{}]: {}",
            err.tool_call_id, err.level, err.error
        ),
    };
    format!("[{}] {}", message.received_at.format("%H:%M:%S%.3f"), body)
}
