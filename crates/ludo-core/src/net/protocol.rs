use serde::{Deserialize, Serialize};

use super::messages::{
    AckMsg, AuthDisconnectMsg, CaptureAckMsg, ClientMessage, EventFrame, MessageType, MoveAckMsg,
    ScoresMsg, ServerMessage,
};

/// Maximum message payload size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug)]
pub enum ProtocolError {
    EmptyMessage,
    UnknownMessageType(u8),
    UnexpectedMessageType(MessageType),
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::UnknownMessageType(b) => write!(f, "unknown message type: 0x{b:02x}"),
            Self::UnexpectedMessageType(t) => write!(f, "unexpected message type: {t:?}"),
            Self::PayloadTooLarge(size) => {
                write!(
                    f,
                    "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})"
                )
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a serializable payload with a 1-byte type prefix. Payloads are
/// MessagePack maps so that field names survive the trip and event data can
/// be validated field by field on the other side.
pub fn encode_message<T: Serialize>(
    msg_type: MessageType,
    payload: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let payload_bytes = rmp_serde::to_vec_named(payload)
        .map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    let total = 1 + payload_bytes.len();
    if total > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(total));
    }
    let mut buf = Vec::with_capacity(total);
    buf.push(msg_type as u8);
    buf.extend_from_slice(&payload_bytes);
    Ok(buf)
}

/// Encode a `ClientMessage` to wire format.
pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ClientMessage::Join(f) => encode_message(MessageType::Join, f),
        ClientMessage::Move(f) => encode_message(MessageType::Move, f),
        ClientMessage::Capture(f) => encode_message(MessageType::Capture, f),
    }
}

/// Encode a `ServerMessage` to wire format.
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ServerMessage::Ack(m) => encode_message(MessageType::Ack, m),
        ServerMessage::Scores(m) => encode_message(MessageType::Scores, m),
        ServerMessage::MoveAck(m) => encode_message(MessageType::MoveAck, m),
        ServerMessage::CaptureAck(m) => encode_message(MessageType::CaptureAck, m),
        ServerMessage::AuthDisconnect(m) => encode_message(MessageType::AuthDisconnect, m),
    }
}

/// Extract the message type byte from raw wire data.
pub fn decode_message_type(data: &[u8]) -> Result<MessageType, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    MessageType::from_byte(data[0]).ok_or(ProtocolError::UnknownMessageType(data[0]))
}

/// Decode a MessagePack payload (bytes after the type prefix).
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    rmp_serde::from_slice(&data[1..]).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Decode raw wire data into a `ClientMessage`.
pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage, ProtocolError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(data.len()));
    }
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::Join => Ok(ClientMessage::Join(decode_payload::<EventFrame>(data)?)),
        MessageType::Move => Ok(ClientMessage::Move(decode_payload::<EventFrame>(data)?)),
        MessageType::Capture => Ok(ClientMessage::Capture(decode_payload::<EventFrame>(data)?)),
        other => Err(ProtocolError::UnexpectedMessageType(other)),
    }
}

/// Decode raw wire data into a `ServerMessage`.
pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::Ack => Ok(ServerMessage::Ack(decode_payload::<AckMsg>(data)?)),
        MessageType::Scores => Ok(ServerMessage::Scores(decode_payload::<ScoresMsg>(data)?)),
        MessageType::MoveAck => Ok(ServerMessage::MoveAck(decode_payload::<MoveAckMsg>(data)?)),
        MessageType::CaptureAck => Ok(ServerMessage::CaptureAck(
            decode_payload::<CaptureAckMsg>(data)?,
        )),
        MessageType::AuthDisconnect => Ok(ServerMessage::AuthDisconnect(decode_payload::<
            AuthDisconnectMsg,
        >(data)?)),
        other => Err(ProtocolError::UnexpectedMessageType(other)),
    }
}
