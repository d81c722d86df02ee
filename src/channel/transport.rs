//! WebSocket transport for the info channel.
//!
//! Thin wrapper around `tokio-tungstenite` that hands out split
//! reader/writer halves and collapses control frames, so the channel's
//! read loop only deals with what it decodes.

use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::endpoint::Endpoint;

use super::ChannelError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Frame as seen by the read loop
#[derive(Debug)]
pub(crate) enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Ping or pong; tungstenite answers pings itself
    Control,
    Close { code: u16, reason: String },
}

pub(crate) struct FrameWriter {
    sink: SplitSink<WsStream, Message>,
}

impl FrameWriter {
    /// Send a close frame and flush.
    pub(crate) async fn close(&mut self) -> Result<(), tungstenite::Error> {
        self.sink.send(Message::Close(None)).await?;
        self.sink.close().await
    }
}

pub(crate) struct FrameReader {
    stream: SplitStream<WsStream>,
}

impl FrameReader {
    /// Next frame, `None` once the stream has ended.
    pub(crate) async fn recv(&mut self) -> Option<Result<Frame, tungstenite::Error>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(Message::Text(text)) => Frame::Text(text),
                Ok(Message::Binary(data)) => Frame::Binary(data),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Frame::Control,
                Ok(Message::Close(close_frame)) => {
                    let (code, reason) = close_frame
                        .map(|cf| (u16::from(cf.code), cf.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    Frame::Close { code, reason }
                }
                // Raw frames never surface when reading
                Ok(Message::Frame(_)) => continue,
                Err(e) => return Some(Err(e)),
            };
            return Some(Ok(frame));
        }
    }
}

/// Perform the WebSocket handshake against `endpoint`.
pub(crate) async fn connect(
    endpoint: &Endpoint,
    timeout: Duration,
) -> Result<(FrameWriter, FrameReader), ChannelError> {
    let handshake = tokio_tungstenite::connect_async(endpoint.as_str());

    let (ws_stream, response) = tokio::time::timeout(timeout, handshake)
        .await
        .map_err(|_| ChannelError::Timeout {
            endpoint: endpoint.to_string(),
            timeout,
        })?
        .map_err(|source| ChannelError::Connect {
            endpoint: endpoint.to_string(),
            source: Box::new(source),
        })?;

    tracing::debug!(
        endpoint = %endpoint,
        status = %response.status(),
        "WebSocket handshake completed"
    );

    let (sink, stream) = ws_stream.split();
    Ok((FrameWriter { sink }, FrameReader { stream }))
}
