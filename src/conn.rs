//! Framed connections.

use crate::{
    codec::{FrameCodec, FrameError},
    types::{Request, Response},
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::{io, net::SocketAddr};
use tokio::net::{
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpStream, ToSocketAddrs,
};
use tokio_util::codec::{FramedRead, FramedWrite};

/// Type alias for identifying connections.
pub type ConnectionId = u64;

/// The receiving half of a [`Connection`].
#[derive(Debug)]
pub struct FrameReader {
    inner: FramedRead<OwnedReadHalf, FrameCodec>,
}

impl FrameReader {
    /// Wait for the next complete frame.
    ///
    /// Returns [`FrameError::Eof`] when the peer closed the connection
    /// between frames.
    pub async fn read_frame(&mut self) -> Result<Bytes, FrameError> {
        match self.inner.next().await {
            Some(res) => res,
            None => Err(FrameError::Eof),
        }
    }
}

/// The sending half of a [`Connection`].
#[derive(Debug)]
pub struct FrameWriter {
    inner: FramedWrite<OwnedWriteHalf, FrameCodec>,
}

impl FrameWriter {
    /// Write one frame and flush it.
    pub async fn write_frame(&mut self, frame: Bytes) -> Result<(), FrameError> {
        self.inner.send(frame).await
    }

    /// Serialize and write a [`Response`].
    pub async fn write_response(&mut self, response: &Response) -> Result<(), FrameError> {
        let frame = response.to_bytes().map_err(FrameError::Serialize)?;
        self.write_frame(frame).await
    }

    /// Serialize and write a [`Request`].
    pub async fn write_request(&mut self, request: &Request) -> Result<(), FrameError> {
        let frame = request.to_bytes().map_err(FrameError::Serialize)?;
        self.write_frame(frame).await
    }

    /// Flush and shut down the write side of the socket.
    pub async fn close(&mut self) -> Result<(), FrameError> {
        SinkExt::<Bytes>::close(&mut self.inner).await
    }
}

/// A bidirectional frame connection over a TCP socket.
///
/// Both halves are framed at construction, so frames the peer pipelines
/// behind the first one are never lost when the connection is later split
/// into a [`FrameReader`] and [`FrameWriter`].
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    remote_addr: SocketAddr,
    reader: FrameReader,
    writer: FrameWriter,
}

impl Connection {
    /// Wrap an accepted socket.
    pub fn new(
        id: ConnectionId,
        stream: TcpStream,
        remote_addr: SocketAddr,
        codec: FrameCodec,
    ) -> Self {
        let (read, write) = stream.into_split();
        Self {
            id,
            remote_addr,
            reader: FrameReader {
                inner: FramedRead::new(read, codec),
            },
            writer: FrameWriter {
                inner: FramedWrite::new(write, codec),
            },
        }
    }

    /// Open a client connection with the default codec.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let remote_addr = stream.peer_addr()?;
        Ok(Self::new(0, stream, remote_addr, FrameCodec::default()))
    }

    /// Connection id assigned by the server.
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Address of the peer.
    pub const fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// See [`FrameReader::read_frame`].
    pub async fn read_frame(&mut self) -> Result<Bytes, FrameError> {
        self.reader.read_frame().await
    }

    /// See [`FrameWriter::write_frame`].
    pub async fn write_frame(&mut self, frame: Bytes) -> Result<(), FrameError> {
        self.writer.write_frame(frame).await
    }

    /// See [`FrameWriter::write_response`].
    pub async fn write_response(&mut self, response: &Response) -> Result<(), FrameError> {
        self.writer.write_response(response).await
    }

    /// See [`FrameWriter::write_request`].
    pub async fn write_request(&mut self, request: &Request) -> Result<(), FrameError> {
        self.writer.write_request(request).await
    }

    /// Read the next frame and decode it as a [`Response`].
    pub async fn read_response(&mut self) -> Result<Response, FrameError> {
        let frame = self.read_frame().await?;
        Response::decode(&frame).map_err(FrameError::Malformed)
    }

    /// Split into independently owned halves. Afterwards, whichever task owns
    /// the [`FrameWriter`] is the only one able to write to the socket.
    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        (self.reader, self.writer)
    }
}
