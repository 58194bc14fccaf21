//! Wire model of the parley voice/chat protocol.
//!
//! - `inbound`: server events, including the `receivedAt`-stamped wrapper.
//! - `outbound`: client events sent inside the JSON envelope.
//! - `tool`: tool call, response and error messages.
//! - `codec`: the envelope codec and its error type.

pub mod codec;
pub mod inbound;
pub mod outbound;
pub mod shared;
pub mod tool;

/// Fields a message carries that this crate has no typed slot for.
pub type Extra = serde_json::Map<String, serde_json::Value>;

pub use codec::{CodecError, Decoded, JsonCodec, MessageCodec};
pub use inbound::{
    AssistantEnd, AudioOutput, ChatMessageEvent, ChatMetadata, InboundMessage, ServerError,
    ServerEvent, UserInterruption,
};
pub use outbound::{
    AssistantInput, AudioSettings, BuiltinTool, ClientEvent, Context, ContextKind,
    PauseAssistantMessage, ResumeAssistantMessage, SessionSettings, ToolDefinition, UserInput,
};
pub use shared::{ChatMessage, ErrorLevel, InvalidErrorLevel, Role};
pub use tool::{ToolCallMessage, ToolErrorMessage, ToolResponseMessage};
