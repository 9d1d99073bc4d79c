// ============================================
// File: crates/wisp-core/src/protocol/codec.rs
// ============================================
//! # Datagram Codec
//!
//! ## Creation Reason
//! Turns raw UDP payloads into [`ControlMessage`] values and back, with
//! error variants precise enough for the dispatcher to log why a
//! datagram was dropped.
//!
//! ## Parsing Strategy
//! 1. Check UTF-8 and parse JSON
//! 2. Require an object with a string `type`
//! 3. Map `type` to a known [`MessageType`], else `UnknownMessageType`
//! 4. Deserialize the typed payload
//!
//! ## Last Modified
//! v0.1.0 - Initial codec implementation

use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::protocol::messages::{ControlMessage, MessageType};

/// Codec for protocol datagrams.
#[derive(Debug, Default, Clone, Copy)]
pub struct DatagramCodec;

impl DatagramCodec {
    /// Decodes a datagram into a message.
    ///
    /// # Errors
    /// - `MalformedDatagram`: not UTF-8 JSON
    /// - `MissingType`: not an object, or no string `type`
    /// - `UnknownMessageType`: `type` names no known message
    /// - `InvalidMessage`: payload does not match the type
    pub fn decode(buf: &[u8]) -> Result<ControlMessage> {
        let value = parse_json(buf)?;
        let msg_type = type_of(&value)?;

        serde_json::from_value(value).map_err(|e| CoreError::InvalidMessage {
            msg_type: msg_type.as_str(),
            reason: e.to_string(),
        })
    }

    /// Encodes a message into a datagram payload.
    ///
    /// # Errors
    /// Fails only if a payload value cannot be represented as JSON.
    pub fn encode(msg: &ControlMessage) -> Result<Vec<u8>> {
        serde_json::to_vec(msg).map_err(|e| CoreError::Encode {
            msg_type: msg.message_type().as_str(),
            reason: e.to_string(),
        })
    }
}

fn parse_json(buf: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(buf).map_err(|e| CoreError::malformed(e.to_string()))?;
    serde_json::from_str(text).map_err(|e| CoreError::malformed(e.to_string()))
}

fn type_of(value: &Value) -> Result<MessageType> {
    let name = value
        .as_object()
        .and_then(|obj| obj.get("type"))
        .and_then(Value::as_str)
        .ok_or(CoreError::MissingType)?;

    MessageType::from_wire(name).ok_or_else(|| CoreError::UnknownMessageType(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::SteerCommand;

    #[test]
    fn test_decode_pull_config() {
        let msg = DatagramCodec::decode(br#"{"type":"pull_config"}"#).unwrap();
        assert_eq!(msg, ControlMessage::PullConfig);
    }

    #[test]
    fn test_decode_raw_register_partial() {
        let msg = DatagramCodec::decode(br#"{"type":"raw_auth_register","uid":"ap-1"}"#).unwrap();
        match msg {
            ControlMessage::RawAuthRegister { uid, public_key, .. } => {
                assert_eq!(uid.unwrap().as_str(), "ap-1");
                assert!(public_key.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = DatagramCodec::decode(b"{not json").unwrap_err();
        assert!(matches!(err, CoreError::MalformedDatagram { .. }));

        let err = DatagramCodec::decode(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, CoreError::MalformedDatagram { .. }));
    }

    #[test]
    fn test_missing_or_unknown_type() {
        assert!(matches!(
            DatagramCodec::decode(b"[1,2,3]").unwrap_err(),
            CoreError::MissingType
        ));
        assert!(matches!(
            DatagramCodec::decode(br#"{"uid":"ap-1"}"#).unwrap_err(),
            CoreError::MissingType
        ));
        match DatagramCodec::decode(br#"{"type":"reboot"}"#).unwrap_err() {
            CoreError::UnknownMessageType(t) => assert_eq!(t, "reboot"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_invalid_payload_names_type() {
        let err = DatagramCodec::decode(br#"{"type":"steer","staMac":"nope"}"#).unwrap_err();
        match err {
            CoreError::InvalidMessage { msg_type, .. } => assert_eq!(msg_type, "steer"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_encode_is_single_line() {
        let msg = ControlMessage::Steer(SteerCommand {
            sta_mac: "AA:BB:CC:DD:EE:FF".parse().unwrap(),
            dst_bssid: "X".into(),
            dst_channel: 40,
        });
        let bytes = DatagramCodec::encode(&msg).unwrap();
        assert!(!bytes.contains(&b'\n'));
        assert_eq!(DatagramCodec::decode(&bytes).unwrap(), msg);
    }
}
