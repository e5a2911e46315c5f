use crate::{Connector, Transport};
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use missive_core::{Call, Error, Operation, Reply, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::io;
use std::marker::PhantomData;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),
    /// A complete frame whose body is not valid JSON for the expected type.
    #[error("JSON error: {reason}")]
    Json { payload: Bytes, reason: String },
    #[error("failed to encode frame: {0}")]
    Encode(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::FrameTooLarge(size) => {
                Error::Codec(format!("frame of {} bytes exceeds the limit", size))
            }
            CodecError::Json { payload, reason } => Error::Parse { payload, reason },
            CodecError::Encode(reason) => Error::Codec(reason),
            CodecError::Io(e) => Error::Unreachable(e.to_string()),
        }
    }
}

/// Length-prefixed JSON frames: a 4-byte big-endian length, then the body.
///
/// Decodes frames into `D`; encodes any serializable item.
pub struct FrameCodec<D> {
    max_frame_size: usize,
    _decodes: PhantomData<fn() -> D>,
}

impl<D> FrameCodec<D> {
    pub fn new() -> Self {
        Self {
            max_frame_size: 10 * 1024 * 1024, // 10MB default
            _decodes: PhantomData,
        }
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            _decodes: PhantomData,
        }
    }
}

impl<D> Default for FrameCodec<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for FrameCodec<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCodec")
            .field("max_frame_size", &self.max_frame_size)
            .finish()
    }
}

impl<D: DeserializeOwned> Decoder for FrameCodec<D> {
    type Item = D;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }

        let mut length_bytes = [0u8; 4];
        length_bytes.copy_from_slice(&src[..4]);
        let frame_len = u32::from_be_bytes(length_bytes) as usize;

        if frame_len > self.max_frame_size {
            return Err(CodecError::FrameTooLarge(frame_len));
        }

        if src.len() < 4 + frame_len {
            src.reserve(4 + frame_len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let frame = src.split_to(frame_len).freeze();

        match serde_json::from_slice(&frame) {
            Ok(item) => Ok(Some(item)),
            Err(e) => Err(CodecError::Json {
                payload: frame,
                reason: e.to_string(),
            }),
        }
    }
}

impl<D, E: Serialize> Encoder<E> for FrameCodec<D> {
    type Error = CodecError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item).map_err(|e| CodecError::Encode(e.to_string()))?;

        if json.len() > self.max_frame_size {
            return Err(CodecError::FrameTooLarge(json.len()));
        }

        dst.reserve(4 + json.len());
        dst.put_u32(json.len() as u32);
        dst.put_slice(&json);
        Ok(())
    }
}

struct Channel<S> {
    framed: Framed<S, FrameCodec<Reply>>,
    // Set while a request is written but its reply not yet read.
    in_flight: bool,
}

/// Client side of the stream binding.
///
/// The stream carries one request/reply pair at a time, so sends are
/// serialized through a mutex. A call cancelled between writing its request
/// and reading the reply leaves the stream unusable.
pub struct FramedTransport<S> {
    channel: Mutex<Channel<S>>,
}

impl<S> FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self::with_codec(stream, FrameCodec::new())
    }

    pub fn with_codec(stream: S, codec: FrameCodec<Reply>) -> Self {
        Self {
            channel: Mutex::new(Channel {
                framed: Framed::new(stream, codec),
                in_flight: false,
            }),
        }
    }
}

impl<S> fmt::Debug for FramedTransport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramedTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl<S> Transport for FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn send(&self, call: &Call, _operation: &Operation) -> Result<Value, Error> {
        let mut channel = self.channel.lock().await;
        if channel.in_flight {
            return Err(Error::Unreachable(
                "stream abandoned mid-call by a cancelled request".to_string(),
            ));
        }

        channel.in_flight = true;
        trace!(operation = call.name(), "writing call frame");
        channel.framed.send(call).await?;

        let reply = match channel.framed.next().await {
            Some(reply) => reply?,
            None => return Err(Error::Unreachable("stream closed by peer".to_string())),
        };
        channel.in_flight = false;

        reply.into_result()
    }

    async fn close(&self) -> Result<(), Error> {
        let mut channel = self.channel.lock().await;
        SinkExt::<&Call>::close(&mut channel.framed).await?;
        debug!("closed framed transport");
        Ok(())
    }
}

/// Opens a [`FramedTransport`] over an already-connected stream.
#[derive(Debug)]
pub struct StreamConnector<S> {
    stream: S,
}

impl<S> StreamConnector<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<S> Connector for StreamConnector<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    type Transport = FramedTransport<S>;

    async fn connect(self) -> Result<Self::Transport, Error> {
        Ok(FramedTransport::new(self.stream))
    }
}

/// Connects a TCP stream and frames it.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Transport = FramedTransport<TcpStream>;

    async fn connect(self) -> Result<Self::Transport, Error> {
        let stream = TcpStream::connect(self.addr.as_str())
            .await
            .map_err(|e| Error::Unreachable(format!("{}: {}", self.addr, e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::Unreachable(e.to_string()))?;
        debug!(addr = %self.addr, "opened framed TCP transport");
        Ok(FramedTransport::new(stream))
    }
}
