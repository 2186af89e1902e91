//! Agent wire protocol
//!
//! Frames are length-delimited (u32 big-endian prefix) JSON documents.
//! A session starts with `attach`, answered by `attached` or `failed`;
//! every following `invoke` is answered by `reply` or `failed`.
//!
//! Invoke methods: `set` and `get` for GPIO lines; `read_coils`,
//! `write_single_coil` and `write_multiple_coils` for coil backends. Coil
//! inversion and batch indexing stay on the driver side.

use crate::error::{CoilAction, CoilProtocolError, DispatchError, Result};
use crate::resource::Technology;
use bytes::{Bytes, BytesMut};
use labwire_protocols::modbus::{ExceptionCode, TransportErrorCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Upper bound for one frame; the largest message is a 2000-coil read reply
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Backend method call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    /// Drive the attached GPIO line
    Set { status: bool },
    /// Read the attached GPIO line
    Get,
    ReadCoils { start: u16, count: u16 },
    WriteSingleCoil { coil: u16, value: bool },
    WriteMultipleCoils { start: u16, values: Vec<bool> },
}

impl Request {
    pub fn method(&self) -> &'static str {
        match self {
            Request::Set { .. } => "set",
            Request::Get => "get",
            Request::ReadCoils { .. } => "read_coils",
            Request::WriteSingleCoil { .. } => "write_single_coil",
            Request::WriteMultipleCoils { .. } => "write_multiple_coils",
        }
    }
}

/// Successful backend result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Reply {
    Done,
    Level(bool),
    Coils(Vec<bool>),
}

impl Reply {
    pub fn into_done(self) -> Result<()> {
        match self {
            Reply::Done => Ok(()),
            other => Err(unexpected(&other, "done")),
        }
    }

    pub fn into_level(self) -> Result<bool> {
        match self {
            Reply::Level(level) => Ok(level),
            other => Err(unexpected(&other, "level")),
        }
    }

    /// Coil states; a malformed reply counts as a frame error of the read.
    pub fn into_coils(self) -> Result<Vec<bool>> {
        match self {
            Reply::Coils(coils) => Ok(coils),
            _ => Err(CoilProtocolError::decode(
                CoilAction::Read,
                TransportErrorCode::Frame,
                ExceptionCode::None,
            )
            .into()),
        }
    }
}

fn unexpected(reply: &Reply, wanted: &str) -> DispatchError {
    DispatchError::connection(format!("expected {} reply, got {:?}", wanted, reply))
}

/// Proxy -> agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Attach { resource: Technology },
    Invoke { request: Request },
}

/// Agent -> proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Attached,
    Reply { reply: Reply },
    Failed { error: DispatchError },
}

pub type AgentFramed = Framed<TcpStream, LengthDelimitedCodec>;

pub fn framed(stream: TcpStream) -> AgentFramed {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec();
    Framed::new(stream, codec)
}

pub fn encode<T: Serialize>(message: &T) -> Result<Bytes> {
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(|e| DispatchError::connection(format!("cannot encode agent message: {}", e)))
}

pub fn decode<T: DeserializeOwned>(frame: &BytesMut) -> Result<T> {
    serde_json::from_slice(frame)
        .map_err(|e| DispatchError::connection(format!("malformed agent message: {}", e)))
}
