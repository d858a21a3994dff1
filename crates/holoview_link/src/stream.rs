//! Viewer frame stream.
//!
//! Every message is `[u32 header_len][u32 payload_len][json header][payload]`
//! with little-endian lengths. Image messages carry their pixels in the
//! payload; control messages have an empty payload. The host speaks
//! [`StreamMessage`], the device answers with [`DeviceMessage`].

use crate::LinkError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const MAX_HEADER_BYTES: usize = 64 * 1024;
const MAX_PAYLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Image codec applied by the device end of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Raw,
    #[default]
    Jpeg,
    Png,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::Raw => write!(f, "raw"),
            Compression::Jpeg => write!(f, "jpeg"),
            Compression::Png => write!(f, "png"),
        }
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(Compression::Raw),
            "jpeg" | "jpg" => Ok(Compression::Jpeg),
            "png" => Ok(Compression::Png),
            other => Err(format!("unknown compression '{other}'")),
        }
    }
}

/// Host to device messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Opens the viewer context on the device.
    Hello { name: String, flags: u32 },
    /// Live session parameters, resent whenever one changes.
    Session {
        compression: Compression,
        quality: u8,
        hdr: bool,
    },
    /// One eye image for one surface; pixels ride in the payload.
    SurfaceFrame {
        surface: u32,
        eye: u8,
        width: u32,
        height: u32,
    },
    /// Passthrough image for the external display.
    ExternalFrame { width: u32, height: u32 },
    /// Opens or moves the external display window.
    ExternalOpen {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    ExternalClose,
    /// End of frame marker carrying the host frame counter.
    Swap { frame: u64 },
    Close,
}

/// Device to host messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceMessage {
    /// Monitor inventory, sent once after `Hello`.
    DisplayInfo { displays: Vec<DisplayBounds> },
    /// The device finished consuming the frame with this counter.
    FrameAck { frame: u64 },
    /// The device asks the host to shut the session down.
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub primary: bool,
}

/// Appends one framed message to `out`.
pub fn encode<T: Serialize>(header: &T, payload: &[u8], out: &mut BytesMut) -> Result<(), LinkError> {
    let hdr = serde_json::to_vec(header)?;
    if hdr.len() > MAX_HEADER_BYTES {
        return Err(LinkError::Oversized(hdr.len()));
    }
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(LinkError::Oversized(payload.len()));
    }
    out.reserve(8 + hdr.len() + payload.len());
    out.put_u32_le(hdr.len() as u32);
    out.put_u32_le(payload.len() as u32);
    out.put_slice(&hdr);
    out.put_slice(payload);
    Ok(())
}

/// Pops one complete message off the front of `buf`, or `None` if more
/// bytes are needed.
pub fn decode<T: DeserializeOwned>(buf: &mut BytesMut) -> Result<Option<(T, Bytes)>, LinkError> {
    if buf.len() < 8 {
        return Ok(None);
    }
    let mut peek: &[u8] = &buf[..];
    let hdr_len = peek.get_u32_le() as usize;
    let payload_len = peek.get_u32_le() as usize;
    if hdr_len > MAX_HEADER_BYTES {
        return Err(LinkError::Oversized(hdr_len));
    }
    if payload_len > MAX_PAYLOAD_BYTES {
        return Err(LinkError::Oversized(payload_len));
    }
    if buf.len() < 8 + hdr_len + payload_len {
        return Ok(None);
    }
    buf.advance(8);
    let hdr = buf.split_to(hdr_len);
    let payload = buf.split_to(payload_len).freeze();
    let header = serde_json::from_slice(&hdr)?;
    Ok(Some((header, payload)))
}

/// Writes one framed message to `w`.
pub async fn write_message<T, W>(w: &mut W, header: &T, payload: &[u8]) -> Result<(), LinkError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let mut out = BytesMut::new();
    encode(header, payload, &mut out)?;
    w.write_all(&out).await?;
    Ok(())
}

/// Reads from `r` into `buf` until one complete message can be decoded.
pub async fn read_message<T, R>(r: &mut R, buf: &mut BytesMut) -> Result<(T, Bytes), LinkError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(m) = decode(buf)? {
            return Ok(m);
        }
        let n = r.read_buf(buf).await?;
        if n == 0 {
            return Err(LinkError::Closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip_with_payload() {
        let header = StreamMessage::SurfaceFrame {
            surface: 2,
            eye: 1,
            width: 4,
            height: 2,
        };
        let pixels = vec![7u8; 4 * 2 * 4];
        let mut buf = BytesMut::new();
        encode(&header, &pixels, &mut buf).unwrap();

        let (decoded, payload): (StreamMessage, Bytes) = decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, header);
        assert_eq!(&payload[..], &pixels[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_message_waits_for_more_bytes() {
        let mut buf = BytesMut::new();
        encode(&StreamMessage::Swap { frame: 9 }, &[], &mut buf).unwrap();
        let mut partial = BytesMut::from(&buf[..buf.len() - 3]);
        assert!(decode::<StreamMessage>(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&buf[buf.len() - 3..]);
        let (msg, _) = decode::<StreamMessage>(&mut partial).unwrap().unwrap();
        assert_eq!(msg, StreamMessage::Swap { frame: 9 });
    }

    #[test]
    fn two_messages_decode_in_order() {
        let mut buf = BytesMut::new();
        encode(&DeviceMessage::FrameAck { frame: 1 }, &[], &mut buf).unwrap();
        encode(&DeviceMessage::FrameAck { frame: 2 }, &[], &mut buf).unwrap();

        let (first, _): (DeviceMessage, _) = decode(&mut buf).unwrap().unwrap();
        let (second, _): (DeviceMessage, _) = decode(&mut buf).unwrap().unwrap();
        assert_eq!(first, DeviceMessage::FrameAck { frame: 1 });
        assert_eq!(second, DeviceMessage::FrameAck { frame: 2 });
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(16);
        buf.put_u32_le((MAX_PAYLOAD_BYTES + 1) as u32);
        buf.put_slice(&[b'x'; 16]);
        assert!(matches!(
            decode::<StreamMessage>(&mut buf),
            Err(LinkError::Oversized(_))
        ));
    }

    #[test]
    fn compression_parses_aliases() {
        assert_eq!("jpg".parse::<Compression>().unwrap(), Compression::Jpeg);
        assert_eq!("png".parse::<Compression>().unwrap(), Compression::Png);
        assert!("mpeg".parse::<Compression>().is_err());
        assert_eq!(Compression::default(), Compression::Jpeg);
    }
}
