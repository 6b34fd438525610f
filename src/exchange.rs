//! Fragment exchange protocol.
//!
//! A two-message exchange carried over one stream per request: the
//! requester sends the hash it wants, the responder answers with the bytes
//! or a not-found signal. Messages are JSON framed with a 4-byte big-endian
//! length prefix. There is no error frame; a malformed request is dropped
//! by the responder without a reply.

use async_trait::async_trait;
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::request_response::Codec;
use libp2p::StreamProtocol;
use serde::{Deserialize, Serialize};
use std::io;

/// Protocol id negotiated for fragment exchange streams.
pub const EXCHANGE_PROTOCOL: &str = "/fragnet/exchange/1.0.0";

/// Upper bound on a single frame.
///
/// Sized for the default 256 KiB fragment after JSON encoding, with
/// headroom for larger configured fragment sizes.
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

const LENGTH_PREFIX_SIZE: usize = 4;

/// Request one fragment by content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRequest {
    pub hash: String,
}

/// Answer to a `FragmentRequest`.
///
/// Echoes the requested hash. When the responder does not hold the
/// fragment, `found` is false and `data` is empty; a false `found` is a
/// per-peer miss, not a protocol failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentResponse {
    pub hash: String,
    pub data: Vec<u8>,
    pub found: bool,
}

impl FragmentResponse {
    pub fn found(hash: String, data: Vec<u8>) -> Self {
        Self {
            hash,
            data,
            found: true,
        }
    }

    pub fn not_found(hash: String) -> Self {
        Self {
            hash,
            data: Vec::new(),
            found: false,
        }
    }
}

/// Length-prefixed JSON codec for the exchange protocol.
#[derive(Debug, Clone)]
pub struct FragmentCodec {
    max_frame_size: usize,
}

impl Default for FragmentCodec {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl FragmentCodec {
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    async fn read_frame<T>(&self, io: &mut T) -> io::Result<Vec<u8>>
    where
        T: AsyncRead + Unpin + Send,
    {
        let mut length_buf = [0u8; LENGTH_PREFIX_SIZE];
        io.read_exact(&mut length_buf).await?;
        let length = u32::from_be_bytes(length_buf) as usize;

        if length == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "empty frame not allowed",
            ));
        }
        if length > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {length} bytes exceeds limit of {}", self.max_frame_size),
            ));
        }

        let mut payload = vec![0u8; length];
        io.read_exact(&mut payload).await?;
        Ok(payload)
    }

    async fn write_frame<T>(&self, io: &mut T, payload: &[u8]) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        if payload.len() > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "frame of {} bytes exceeds limit of {}",
                    payload.len(),
                    self.max_frame_size
                ),
            ));
        }

        io.write_all(&(payload.len() as u32).to_be_bytes()).await?;
        io.write_all(payload).await?;
        io.flush().await
    }
}

#[async_trait]
impl Codec for FragmentCodec {
    type Protocol = StreamProtocol;
    type Request = FragmentRequest;
    type Response = FragmentResponse;

    async fn read_request<T>(
        &mut self,
        _protocol: &StreamProtocol,
        io: &mut T,
    ) -> io::Result<Self::Request>
    where
        T: AsyncRead + Unpin + Send,
    {
        let payload = self.read_frame(io).await?;
        serde_json::from_slice(&payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    async fn read_response<T>(
        &mut self,
        _protocol: &StreamProtocol,
        io: &mut T,
    ) -> io::Result<Self::Response>
    where
        T: AsyncRead + Unpin + Send,
    {
        let payload = self.read_frame(io).await?;
        serde_json::from_slice(&payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    async fn write_request<T>(
        &mut self,
        _protocol: &StreamProtocol,
        io: &mut T,
        request: Self::Request,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        let payload = serde_json::to_vec(&request)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.write_frame(io, &payload).await
    }

    async fn write_response<T>(
        &mut self,
        _protocol: &StreamProtocol,
        io: &mut T,
        response: Self::Response,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        let payload = serde_json::to_vec(&response)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.write_frame(io, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;

    fn protocol() -> StreamProtocol {
        StreamProtocol::new(EXCHANGE_PROTOCOL)
    }

    #[test]
    fn test_protocol_id() {
        assert_eq!(protocol().as_ref(), "/fragnet/exchange/1.0.0");
    }

    #[tokio::test]
    async fn test_request_roundtrip() {
        let mut codec = FragmentCodec::default();
        let request = FragmentRequest {
            hash: "ab".repeat(32),
        };

        let mut buffer = Vec::new();
        codec
            .write_request(&protocol(), &mut buffer, request.clone())
            .await
            .unwrap();

        let mut cursor = Cursor::new(buffer);
        let restored = codec.read_request(&protocol(), &mut cursor).await.unwrap();
        assert_eq!(restored, request);
    }

    #[tokio::test]
    async fn test_found_response_roundtrip() {
        let mut codec = FragmentCodec::default();
        let response = FragmentResponse::found("cd".repeat(32), vec![7u8; 4096]);

        let mut buffer = Vec::new();
        codec
            .write_response(&protocol(), &mut buffer, response.clone())
            .await
            .unwrap();

        let mut cursor = Cursor::new(buffer);
        let restored = codec.read_response(&protocol(), &mut cursor).await.unwrap();
        assert_eq!(restored, response);
        assert!(restored.found);
    }

    #[tokio::test]
    async fn test_not_found_response_roundtrip() {
        let mut codec = FragmentCodec::default();
        let response = FragmentResponse::not_found("ef".repeat(32));

        let mut buffer = Vec::new();
        codec
            .write_response(&protocol(), &mut buffer, response.clone())
            .await
            .unwrap();

        let mut cursor = Cursor::new(buffer);
        let restored = codec.read_response(&protocol(), &mut cursor).await.unwrap();
        assert!(!restored.found);
        assert!(restored.data.is_empty());
        assert_eq!(restored.hash, response.hash);
    }

    #[tokio::test]
    async fn test_length_prefix_matches_payload() {
        let mut codec = FragmentCodec::default();
        let request = FragmentRequest {
            hash: "12".repeat(32),
        };

        let mut buffer = Vec::new();
        codec
            .write_request(&protocol(), &mut buffer, request)
            .await
            .unwrap();

        let length = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
        assert_eq!(length, buffer.len() - LENGTH_PREFIX_SIZE);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_on_read() {
        let mut codec = FragmentCodec::with_max_frame_size(64);

        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(128u32).to_be_bytes());
        buffer.extend_from_slice(&[0u8; 128]);

        let mut cursor = Cursor::new(buffer);
        let result = codec.read_request(&protocol(), &mut cursor).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_on_write() {
        let mut codec = FragmentCodec::with_max_frame_size(16);
        let response = FragmentResponse::found("aa".repeat(32), vec![0u8; 64]);

        let mut buffer = Vec::new();
        let result = codec.write_response(&protocol(), &mut buffer, response).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_truncated_payload_is_eof() {
        let mut codec = FragmentCodec::default();

        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(100u32).to_be_bytes());
        buffer.extend_from_slice(&[0u8; 40]);

        let mut cursor = Cursor::new(buffer);
        let result = codec.read_request(&protocol(), &mut cursor).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_garbage_payload_is_invalid_data() {
        let mut codec = FragmentCodec::default();

        let garbage = b"\xff\xfe not json";
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(garbage.len() as u32).to_be_bytes());
        buffer.extend_from_slice(garbage);

        let mut cursor = Cursor::new(buffer);
        let result = codec.read_request(&protocol(), &mut cursor).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::InvalidData);
    }
}
