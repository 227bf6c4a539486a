//! Batch session wire protocol.
//!
//! Client commands are tagged by `command`, server messages by `type`. Each
//! message travels as one text frame; closes carry a numeric code and reason.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::models::{Credential, ProviderConfig, ValidationResult};

/// Normal close after `done`.
pub const CLOSE_COMPLETE: u16 = 1000;
/// Close after a client `stop`.
pub const CLOSE_STOPPED: u16 = 4000;
/// Close after a session `error`.
pub const CLOSE_SERVER_ERROR: u16 = 1011;

pub const REASON_COMPLETE: &str = "batch complete";
pub const REASON_STOPPED: &str = "stopped by client";
pub const REASON_SERVER_ERROR: &str = "server error";

// =============================================================================
// Client -> Server
// =============================================================================

/// Commands the orchestrator sends to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ClientCommand {
    Start { data: StartPayload },
    Stop,
}

/// Body of a `start` command.
///
/// Every field defaults so that an incomplete payload still parses and the
/// session can answer with a specific error instead of "malformed JSON".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    #[serde(default)]
    pub tokens: Vec<Credential>,
    #[serde(default)]
    pub provider_config: Option<ProviderConfig>,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

/// Why a client text frame could not be turned into a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Not JSON, or not a known command.
    #[error("malformed command: {0}")]
    Malformed(serde_json::Error),
    /// A `start` whose payload does not decode.
    #[error("invalid start payload: {0}")]
    InvalidStart(String),
}

impl ClientCommand {
    /// Decode a client text frame.
    ///
    /// A frame tagged `start` is judged on its payload alone, so a bad
    /// `data` is reported as [`CommandError::InvalidStart`] rather than as
    /// a malformed frame.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when the frame is not a usable command.
    pub fn decode(text: &str) -> Result<Self, CommandError> {
        let mut value: Value = serde_json::from_str(text).map_err(CommandError::Malformed)?;
        if value.get("command").and_then(Value::as_str) != Some("start") {
            return serde_json::from_value(value).map_err(CommandError::Malformed);
        }
        let data = value
            .get_mut("data")
            .map(Value::take)
            .ok_or_else(|| CommandError::InvalidStart("missing data".to_string()))?;
        serde_json::from_value::<StartPayload>(data)
            .map(|data| Self::Start { data })
            .map_err(|e| CommandError::InvalidStart(e.to_string()))
    }

    #[must_use]
    pub fn start(tokens: Vec<Credential>, provider_config: ProviderConfig, concurrency: usize) -> Self {
        Self::Start {
            data: StartPayload {
                tokens,
                provider_config: Some(provider_config),
                concurrency: Some(concurrency),
            },
        }
    }

    /// Encode as a text frame payload.
    #[must_use]
    pub fn to_text(&self) -> String {
        // Plain data with string keys; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

// =============================================================================
// Server -> Client
// =============================================================================

/// Messages a session sends back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Result { data: ValidationResult },
    Status { message: String },
    Error { message: String },
    Done { message: String },
}

impl ServerMessage {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode a text frame payload.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for frames that are not server messages.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

// =============================================================================
// Frames
// =============================================================================

/// One transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close { code: u16, reason: String },
}

impl Frame {
    #[must_use]
    pub fn close(code: u16, reason: &str) -> Self {
        Self::Close {
            code,
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn message(message: &ServerMessage) -> Self {
        Self::Text(message.to_text())
    }
}

/// Any close code other than normal completion means the batch was cut short.
#[must_use]
pub const fn is_abnormal_close(code: u16) -> bool {
    code != CLOSE_COMPLETE
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn start_command_wire_shape() {
        let command = ClientCommand::start(
            vec![Credential::new("sk-1", 0)],
            ProviderConfig::for_provider("openai"),
            5,
        );
        let value: serde_json::Value = serde_json::from_str(&command.to_text()).unwrap();
        assert_eq!(value["command"], "start");
        assert_eq!(value["data"]["tokens"][0], json!({"token": "sk-1", "order": 0}));
        assert_eq!(value["data"]["providerConfig"]["provider"], "openai");
        assert_eq!(value["data"]["concurrency"], 5);
    }

    #[test]
    fn stop_command_parses() {
        let command: ClientCommand = serde_json::from_str(r#"{"command":"stop"}"#).unwrap();
        assert_eq!(command, ClientCommand::Stop);
    }

    #[test]
    fn incomplete_start_still_parses() {
        let command: ClientCommand =
            serde_json::from_str(r#"{"command":"start","data":{}}"#).unwrap();
        let ClientCommand::Start { data } = command else {
            panic!("expected start");
        };
        assert!(data.tokens.is_empty());
        assert!(data.provider_config.is_none());
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(serde_json::from_str::<ClientCommand>(r#"{"command":"pause"}"#).is_err());
        assert!(matches!(
            ClientCommand::decode(r#"{"command":"pause"}"#),
            Err(CommandError::Malformed(_))
        ));
        assert!(matches!(ClientCommand::decode("{oops"), Err(CommandError::Malformed(_))));
    }

    #[test]
    fn bad_start_payload_is_an_invalid_start() {
        for text in [
            r#"{"command":"start"}"#,
            r#"{"command":"start","data":null}"#,
            r#"{"command":"start","data":{"tokens":"not-a-list"}}"#,
        ] {
            assert!(
                matches!(ClientCommand::decode(text), Err(CommandError::InvalidStart(_))),
                "{text}"
            );
        }
        assert_eq!(
            ClientCommand::decode(r#"{"command":"stop"}"#).unwrap(),
            ClientCommand::Stop
        );
    }

    #[test]
    fn server_messages_are_type_tagged() {
        let text = ServerMessage::Done {
            message: "batch complete".to_string(),
        }
        .to_text();
        assert_eq!(text, r#"{"type":"done","message":"batch complete"}"#);

        let parsed = ServerMessage::parse(
            r#"{"type":"result","data":{"token":"k","isValid":true,"order":9}}"#,
        )
        .unwrap();
        let ServerMessage::Result { data } = parsed else {
            panic!("expected result");
        };
        assert_eq!(data.order, 9);
        assert!(data.is_valid);
    }

    #[test]
    fn only_non_normal_closes_are_abnormal() {
        assert!(!is_abnormal_close(CLOSE_COMPLETE));
        assert!(is_abnormal_close(CLOSE_STOPPED));
        assert!(is_abnormal_close(CLOSE_SERVER_ERROR));
        assert!(is_abnormal_close(1006));
    }
}
