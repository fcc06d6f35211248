//! Text codec for Socket.IO v5 packets carried by Engine.IO v4 frames.
//!
//! Only the websocket transport is spoken, so every frame is exactly one
//! Engine.IO packet and no payload batching is needed. Binary packets are
//! rejected; the job channel never emits them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Engine.IO protocol revision requested in the connection URL.
pub const ENGINE_IO_VERSION: &str = "4";

const DEFAULT_NAMESPACE: &str = "/";

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("empty frame")]
    Empty,

    #[error("unknown engine.io packet type '{0}'")]
    UnknownEngineType(char),

    #[error("unknown socket.io packet type '{0}'")]
    UnknownSocketType(char),

    #[error("binary socket.io packets are not supported")]
    Binary,

    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("invalid json payload: {0}")]
    Json(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::Json(err.to_string())
    }
}

/// Payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// Socket.IO packet, the payload of an Engine.IO `message`.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl SocketPacket {
    /// Connect to the default namespace presenting `auth` as the
    /// handshake credential.
    pub fn connect_with_auth(auth: Value) -> Self {
        SocketPacket::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: Some(auth),
        }
    }

    fn type_digit(&self) -> char {
        match self {
            SocketPacket::Connect { .. } => '0',
            SocketPacket::Disconnect { .. } => '1',
            SocketPacket::Event { .. } => '2',
            SocketPacket::Ack { .. } => '3',
            SocketPacket::ConnectError { .. } => '4',
        }
    }

    fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.type_digit());
        let namespace = self.namespace();
        if namespace != DEFAULT_NAMESPACE && !namespace.is_empty() {
            out.push_str(namespace);
            out.push(',');
        }
        match self {
            SocketPacket::Connect { data, .. }
            | SocketPacket::ConnectError { data, .. } => {
                if let Some(data) = data {
                    out.push_str(&data.to_string());
                }
            }
            SocketPacket::Disconnect { .. } => {}
            SocketPacket::Event { id, name, args, .. } => {
                if let Some(id) = id {
                    out.push_str(&id.to_string());
                }
                let mut array = Vec::with_capacity(args.len() + 1);
                array.push(Value::String(name.clone()));
                array.extend(args.iter().cloned());
                out.push_str(&Value::Array(array).to_string());
            }
            SocketPacket::Ack { id, args, .. } => {
                out.push_str(&id.to_string());
                out.push_str(&Value::Array(args.clone()).to_string());
            }
        }
        out
    }

    fn decode(body: &str) -> Result<Self, CodecError> {
        let mut chars = body.chars();
        let kind = chars.next().ok_or(CodecError::Empty)?;
        let rest = chars.as_str();

        if matches!(kind, '5' | '6') {
            return Err(CodecError::Binary);
        }

        let (namespace, rest) = split_namespace(rest);
        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        let (id_str, payload) = rest.split_at(digits);
        let id = if id_str.is_empty() {
            None
        } else {
            Some(id_str.parse::<u64>().map_err(|e| {
                CodecError::Malformed(format!("ack id: {e}"))
            })?)
        };
        let data = if payload.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(payload)?)
        };

        match kind {
            '0' => Ok(SocketPacket::Connect { namespace, data }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let mut items = match data {
                    Some(Value::Array(items)) => items,
                    _ => {
                        return Err(CodecError::Malformed(
                            "event payload must be a json array".into(),
                        ));
                    }
                };
                if items.is_empty() {
                    return Err(CodecError::Malformed(
                        "event payload missing name".into(),
                    ));
                }
                let name = match items.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(CodecError::Malformed(format!(
                            "event name must be a string, got {other}"
                        )));
                    }
                };
                Ok(SocketPacket::Event {
                    namespace,
                    id,
                    name,
                    args: items,
                })
            }
            '3' => {
                let id = id.ok_or_else(|| {
                    CodecError::Malformed("ack without id".into())
                })?;
                let args = match data {
                    Some(Value::Array(items)) => items,
                    None => Vec::new(),
                    Some(other) => vec![other],
                };
                Ok(SocketPacket::Ack {
                    namespace,
                    id,
                    args,
                })
            }
            '4' => Ok(SocketPacket::ConnectError { namespace, data }),
            other => Err(CodecError::UnknownSocketType(other)),
        }
    }
}

fn split_namespace(rest: &str) -> (String, &str) {
    if rest.starts_with('/') {
        match rest.find(',') {
            Some(idx) => (rest[..idx].to_string(), &rest[idx + 1..]),
            None => (rest.to_string(), ""),
        }
    } else {
        (DEFAULT_NAMESPACE.to_string(), rest)
    }
}

/// One Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

impl Packet {
    pub fn decode(frame: &str) -> Result<Self, CodecError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(CodecError::Empty)?;
        let rest = chars.as_str();
        match kind {
            '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Packet::Close),
            // "2probe"/"3probe" only appear while upgrading from polling.
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => Ok(Packet::Message(SocketPacket::decode(rest)?)),
            '5' => Ok(Packet::Upgrade),
            '6' => Ok(Packet::Noop),
            other => Err(CodecError::UnknownEngineType(other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Packet::Open(handshake) => format!(
                "0{}",
                serde_json::to_string(handshake).unwrap_or_default()
            ),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Message(packet) => format!("4{}", packet.encode()),
            Packet::Upgrade => "5".to_string(),
            Packet::Noop => "6".to_string(),
        }
    }
}

/// Human readable reason carried by a `connect_error` packet. Servers send
/// either `{"message": ...}` or a bare string.
pub fn connect_error_reason(data: Option<&Value>) -> String {
    match data {
        Some(Value::Object(map)) => map
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("connection rejected")
            .to_string(),
        Some(Value::String(reason)) => reason.clone(),
        _ => "connection rejected".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_open_handshake() {
        let frame = r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        match Packet::decode(frame).unwrap() {
            Packet::Open(handshake) => {
                assert_eq!(handshake.sid, "abc");
                assert_eq!(handshake.ping_interval, 25_000);
                assert_eq!(handshake.ping_timeout, 20_000);
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn connect_with_auth_matches_wire_form() {
        let packet = Packet::Message(SocketPacket::connect_with_auth(
            json!({ "token": "t0k" }),
        ));
        assert_eq!(packet.encode(), r#"40{"token":"t0k"}"#);
    }

    #[test]
    fn decodes_event_with_namespace_and_ack() {
        let frame = r#"42/jobs,7["job_progress",{"jobId":"j1"}]"#;
        let packet = Packet::decode(frame).unwrap();
        assert_eq!(
            packet,
            Packet::Message(SocketPacket::Event {
                namespace: "/jobs".into(),
                id: Some(7),
                name: "job_progress".into(),
                args: vec![json!({ "jobId": "j1" })],
            })
        );
        assert_eq!(packet.encode(), frame);
    }

    #[test]
    fn decodes_connect_error_reason() {
        let packet =
            Packet::decode(r#"44{"message":"invalid token"}"#).unwrap();
        let Packet::Message(SocketPacket::ConnectError { data, .. }) = packet
        else {
            panic!("expected connect error");
        };
        assert_eq!(connect_error_reason(data.as_ref()), "invalid token");
        assert_eq!(connect_error_reason(None), "connection rejected");
    }

    #[test]
    fn control_packets() {
        assert_eq!(Packet::decode("2").unwrap(), Packet::Ping);
        assert_eq!(Packet::decode("2probe").unwrap(), Packet::Ping);
        assert_eq!(Packet::Pong.encode(), "3");
        assert_eq!(
            Packet::decode("41").unwrap(),
            Packet::Message(SocketPacket::Disconnect {
                namespace: "/".into()
            })
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(Packet::decode(""), Err(CodecError::Empty));
        assert_eq!(
            Packet::decode("9"),
            Err(CodecError::UnknownEngineType('9'))
        );
        assert_eq!(
            Packet::decode(r#"451-["x",{"_placeholder":true,"num":0}]"#),
            Err(CodecError::Binary)
        );
        assert!(matches!(
            Packet::decode(r#"42{"not":"array"}"#),
            Err(CodecError::Malformed(_))
        ));
    }
}
