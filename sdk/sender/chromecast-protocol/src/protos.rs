//! The `extensions.api.cast_channel.CastMessage` envelope.
//!
//! Field numbers and labels follow `cast_channel.proto` (proto2). The derive
//! mirrors what `prost-build` generates so no `protoc` is needed at build time.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CastMessage {
    #[prost(enumeration = "cast_message::ProtocolVersion", required, tag = "1")]
    pub protocol_version: i32,
    /// Logical endpoint of the sender, e.g. `sender-0`.
    #[prost(string, required, tag = "2")]
    pub source_id: String,
    /// Logical endpoint of the recipient, e.g. `receiver-0` or an application transport id.
    #[prost(string, required, tag = "3")]
    pub destination_id: String,
    #[prost(string, required, tag = "4")]
    pub namespace: String,
    #[prost(enumeration = "cast_message::PayloadType", required, tag = "5")]
    pub payload_type: i32,
    #[prost(string, optional, tag = "6")]
    pub payload_utf8: Option<String>,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub payload_binary: Option<Vec<u8>>,
}

pub mod cast_message {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum ProtocolVersion {
        Castv210 = 0,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum PayloadType {
        String = 0,
        Binary = 1,
    }
}

/// Payload of a [`CastMessage`], exactly one of text or bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Utf8(String),
    Binary(Vec<u8>),
}

impl CastMessage {
    pub fn new(
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        namespace: impl Into<String>,
        payload: Payload,
    ) -> Self {
        let (payload_type, payload_utf8, payload_binary) = match payload {
            Payload::Utf8(text) => (cast_message::PayloadType::String, Some(text), None),
            Payload::Binary(bytes) => (cast_message::PayloadType::Binary, None, Some(bytes)),
        };
        Self {
            protocol_version: cast_message::ProtocolVersion::Castv210.into(),
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            namespace: namespace.into(),
            payload_type: payload_type.into(),
            payload_utf8,
            payload_binary,
        }
    }

    /// Returns the payload selected by `payload_type`, or `None` if the
    /// envelope does not carry the field its type announces.
    pub fn payload(&self) -> Option<Payload> {
        match cast_message::PayloadType::try_from(self.payload_type) {
            Ok(cast_message::PayloadType::String) => self.payload_utf8.clone().map(Payload::Utf8),
            Ok(cast_message::PayloadType::Binary) => {
                self.payload_binary.clone().map(Payload::Binary)
            }
            Err(_) => None,
        }
    }
}
