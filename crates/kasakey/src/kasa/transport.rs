use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

use super::codec;
use super::protocol::DeviceError;
use crate::config::DeviceConfig;

/// Size of each socket read while collecting a response.
const READ_CHUNK_SIZE: usize = 1024;

/// Trait for the request/response exchange with a plug
///
/// This trait allows for mocking the network for testing purposes
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one framed request to the plug at `address` and return its framed response.
    async fn exchange(&self, address: &str, request: &[u8]) -> Result<Vec<u8>, DeviceError>;
}

/// One TCP connection per command, bounded by a connect timeout and an I/O deadline.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    port: u16,
    connect_timeout: Duration,
    io_timeout: Duration,
    max_response_bytes: usize,
}

impl TcpTransport {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            port: config.port,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            io_timeout: Duration::from_millis(config.io_timeout_ms),
            max_response_bytes: config.max_response_bytes,
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn exchange(&self, address: &str, request: &[u8]) -> Result<Vec<u8>, DeviceError> {
        let connect = TcpStream::connect((address, self.port));
        let mut stream = match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(DeviceError::Unreachable {
                    address: address.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(DeviceError::Unreachable {
                    address: address.to_string(),
                    source: timed_out("connect"),
                });
            }
        };
        debug!(address, port = self.port, "connected to plug");

        // Read and write share a single deadline counted from the connection.
        let deadline = Instant::now() + self.io_timeout;

        match tokio::time::timeout_at(deadline, stream.write_all(request)).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                return Err(DeviceError::CommandSendFailed {
                    address: address.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(DeviceError::CommandSendFailed {
                    address: address.to_string(),
                    source: timed_out("write"),
                });
            }
        }

        let read = read_response(&mut stream, self.max_response_bytes);
        let response = match tokio::time::timeout_at(deadline, read).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                return Err(DeviceError::ResponseReadFailed {
                    address: address.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(DeviceError::ResponseReadFailed {
                    address: address.to_string(),
                    source: timed_out("read"),
                });
            }
        };

        debug!(address, bytes = response.len(), "received response from plug");
        Ok(response)
    }
}

/// Read one framed response.
///
/// Stops once the length declared in the header has arrived or the peer
/// closes the connection, whichever comes first. Never buffers more than
/// `max_bytes`.
async fn read_response<R>(stream: &mut R, max_bytes: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut response = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        if let Some(len) = codec::declared_len(&response) {
            let frame_len = codec::HEADER_SIZE + len;
            if response.len() >= frame_len {
                response.truncate(frame_len);
                break;
            }
        }

        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if response.len() + n > max_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("response exceeds {} bytes", max_bytes),
            ));
        }
        response.extend_from_slice(&chunk[..n]);
    }

    if response.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed without a response",
        ));
    }

    Ok(response)
}

fn timed_out(op: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{} timed out", op))
}

/// Reply the mock sends when no canned response is configured
#[cfg(test)]
const MOCK_DEFAULT_REPLY: &str = r#"{"system":{"set_relay_state":{"err_code":0}}}"#;

/// A request seen by [`MockTransport`]
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct RecordedExchange {
    pub address: String,
    pub request: Vec<u8>,
    pub at: std::time::Instant,
}

/// Mock transport for testing
///
/// Records every exchange, and copies request bytes onto a shared `wire`
/// one at a time, yielding in between, so interleaved writes would show up.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: std::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>,
    failing: std::sync::Mutex<std::collections::HashSet<String>>,
    exchanges: std::sync::Mutex<Vec<RecordedExchange>>,
    wire: std::sync::Mutex<Vec<u8>>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests to `address` with the given plaintext JSON
    pub fn respond_with(&self, address: &str, plaintext: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(address.to_string(), codec::encode(plaintext.as_bytes()));
    }

    /// Make every exchange with `address` fail as unreachable
    pub fn fail(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    pub fn exchanges(&self) -> Vec<RecordedExchange> {
        self.exchanges.lock().unwrap().clone()
    }

    /// Decoded plaintext of every request sent to `address`, in order
    pub fn requests_to(&self, address: &str) -> Vec<String> {
        self.exchanges()
            .into_iter()
            .filter(|e| e.address == address)
            .map(|e| String::from_utf8_lossy(&codec::decode(&e.request)).into_owned())
            .collect()
    }

    pub fn wire(&self) -> Vec<u8> {
        self.wire.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for MockTransport {
    async fn exchange(&self, address: &str, request: &[u8]) -> Result<Vec<u8>, DeviceError> {
        {
            let mut exchanges = self.exchanges.lock().unwrap();
            exchanges.push(RecordedExchange {
                address: address.to_string(),
                request: request.to_vec(),
                at: std::time::Instant::now(),
            });
        }

        let failing = { self.failing.lock().unwrap().contains(address) };
        if failing {
            return Err(DeviceError::Unreachable {
                address: address.to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            });
        }

        for &byte in request {
            {
                self.wire.lock().unwrap().push(byte);
            }
            tokio::task::yield_now().await;
        }

        let response = { self.responses.lock().unwrap().get(address).cloned() };
        Ok(response.unwrap_or_else(|| codec::encode(MOCK_DEFAULT_REPLY.as_bytes())))
    }
}
