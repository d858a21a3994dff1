//! Tray control channel.
//!
//! The device runs a small tray service that owns the lifecycle of the
//! viewer application. Commands are single JSON objects terminated by one
//! NUL byte; the reply is a JSON `{code, message}` object, also
//! NUL-terminated. Code 200 means success. Transport failures are folded
//! into a synthetic code -1 reply so callers can treat every outcome as a
//! response.

use crate::LinkError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a single control message, command or reply.
const MAX_MESSAGE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArgs {
    pub app: String,
    pub close_others: bool,
    /// Command line handed to the launched application, first entry is the
    /// stream port it should listen on.
    pub cmdln: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillArgs {
    pub app: String,
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "lowercase")]
pub enum TrayCommand {
    Launch(LaunchArgs),
    Kill(KillArgs),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrayResponse {
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

impl TrayResponse {
    pub fn ok(&self) -> bool {
        self.code == 200
    }

    /// Synthetic reply for transport-level failures.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            code: -1,
            message: message.into(),
        }
    }
}

/// Serializes `value` followed by the NUL terminator.
pub fn encode_nul_json<T: Serialize>(value: &T) -> Result<Vec<u8>, LinkError> {
    let mut out = serde_json::to_vec(value)?;
    out.push(0);
    Ok(out)
}

/// Reads one NUL-terminated JSON message from `r`.
pub async fn read_nul_json<T, R>(r: &mut R) -> Result<T, LinkError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(256);
    let mut chunk = [0u8; 1024];
    loop {
        let n = r.read(&mut chunk).await?;
        if n == 0 {
            return Err(LinkError::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_MESSAGE_BYTES {
            return Err(LinkError::Oversized(buf.len()));
        }
        if buf.last() == Some(&0) {
            break;
        }
    }
    buf.pop();
    Ok(serde_json::from_slice(&buf)?)
}

/// Writes one NUL-terminated JSON message to `w`.
pub async fn write_nul_json<T, W>(w: &mut W, value: &T) -> Result<(), LinkError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let bytes = encode_nul_json(value)?;
    w.write_all(&bytes).await?;
    Ok(())
}

/// Client for the device tray service.
#[derive(Debug, Clone)]
pub struct TrayClient {
    host: String,
    port: u16,
}

impl TrayClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Asks the tray to start the viewer application listening on
    /// `stream_port`, closing any competing instance.
    pub async fn launch(&self, app: &str, stream_port: u16) -> TrayResponse {
        self.request(&TrayCommand::Launch(LaunchArgs {
            app: app.into(),
            close_others: true,
            cmdln: vec![stream_port],
        }))
        .await
    }

    /// Asks the tray to terminate the viewer application.
    pub async fn kill(&self, app: &str) -> TrayResponse {
        self.request(&TrayCommand::Kill(KillArgs {
            app: app.into(),
            force: true,
        }))
        .await
    }

    /// Sends one command and waits for its reply. Every failure mode comes
    /// back as a code -1 response.
    pub async fn request(&self, command: &TrayCommand) -> TrayResponse {
        match tokio::time::timeout(REQUEST_TIMEOUT, self.exchange(command)).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                tracing::warn!(host = %self.host, port = self.port, error = %e, "Tray request failed");
                TrayResponse::failure(e.to_string())
            }
            Err(_) => {
                tracing::warn!(host = %self.host, port = self.port, "Tray request timed out");
                TrayResponse::failure("tray request timed out")
            }
        }
    }

    async fn exchange(&self, command: &TrayCommand) -> Result<TrayResponse, LinkError> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        write_nul_json(&mut stream, command).await?;
        read_nul_json(&mut stream).await
    }
}
