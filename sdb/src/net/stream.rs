//! Thin async TCP stream wrapper, without TLS (out of scope for this
//! substrate).

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::error::Error;

/// A connected socket. Wrapping `TcpStream` in our own type keeps the
/// door open for an in-memory test transport without touching call
/// sites.
#[derive(Debug)]
pub struct Stream(TcpStream);

impl Stream {
    pub async fn connect(addr: &str) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).ok();
        Ok(Self(stream))
    }

    pub fn from_tcp(stream: TcpStream) -> Self {
        stream.set_nodelay(true).ok();
        Self(stream)
    }

    pub fn peer_addr(&self) -> Option<String> {
        self.0.peer_addr().ok().map(|a| a.to_string())
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}
