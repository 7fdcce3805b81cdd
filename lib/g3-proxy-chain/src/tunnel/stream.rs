/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, Bytes};
use h2::{Reason, RecvStream, SendStream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

fn h2_to_io_error(e: h2::Error) -> io::Error {
    if e.is_io() {
        e.into_io()
            .unwrap_or_else(|| io::Error::other("h2 io error"))
    } else {
        io::Error::other(e)
    }
}

/// Read half, fed by the response body of the switch request.
pub(crate) struct H2StreamReader {
    recv_stream: RecvStream,
    received_bytes: Option<Bytes>,
}

impl H2StreamReader {
    pub(crate) fn new(recv_stream: RecvStream) -> Self {
        H2StreamReader {
            recv_stream,
            received_bytes: None,
        }
    }
}

impl AsyncRead for H2StreamReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            if let Some(mut b) = self.received_bytes.take() {
                let to_copy = buf.remaining().min(b.len());
                buf.put_slice(&b[..to_copy]);
                b.advance(to_copy);
                if b.has_remaining() {
                    self.received_bytes = Some(b);
                }
                self.recv_stream
                    .flow_control()
                    .release_capacity(to_copy)
                    .map_err(h2_to_io_error)?;
                return Poll::Ready(Ok(()));
            }

            match ready!(self.recv_stream.poll_data(cx)) {
                Some(Ok(b)) => {
                    if !b.is_empty() {
                        self.received_bytes = Some(b);
                    }
                }
                Some(Err(e)) => {
                    return match e.reason() {
                        // the peer closed the tunnel
                        Some(Reason::NO_ERROR) | Some(Reason::CANCEL) => Poll::Ready(Ok(())),
                        _ => Poll::Ready(Err(h2_to_io_error(e))),
                    };
                }
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}

/// Write half, the send side of the switch request body.
pub(crate) struct H2StreamWriter {
    send_stream: SendStream<Bytes>,
}

impl H2StreamWriter {
    pub(crate) fn new(send_stream: SendStream<Bytes>) -> Self {
        H2StreamWriter { send_stream }
    }

    fn poll_reset_error(&mut self, cx: &mut Context<'_>) -> Poll<io::Error> {
        match ready!(self.send_stream.poll_reset(cx)) {
            Ok(Reason::NO_ERROR) | Ok(Reason::CANCEL) | Ok(Reason::STREAM_CLOSED) => {
                Poll::Ready(io::Error::from(io::ErrorKind::BrokenPipe))
            }
            Ok(reason) => Poll::Ready(h2_to_io_error(reason.into())),
            Err(e) => Poll::Ready(h2_to_io_error(e)),
        }
    }
}

impl AsyncWrite for H2StreamWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        self.send_stream.reserve_capacity(buf.len());
        let sent = loop {
            match ready!(self.send_stream.poll_capacity(cx)) {
                Some(Ok(0)) => {}
                Some(Ok(n)) => {
                    let n = n.min(buf.len());
                    break self
                        .send_stream
                        .send_data(Bytes::copy_from_slice(&buf[..n]), false)
                        .ok()
                        .map(|_| n);
                }
                Some(Err(_)) | None => break None,
            }
        };
        match sent {
            Some(n) => Poll::Ready(Ok(n)),
            None => {
                let e = ready!(self.poll_reset_error(cx));
                Poll::Ready(Err(e))
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.send_stream.send_data(Bytes::new(), true).is_ok() {
            return Poll::Ready(Ok(()));
        }
        let e = ready!(self.poll_reset_error(cx));
        Poll::Ready(Err(e))
    }
}

/// A tunnel over one HTTP/2 CONNECT exchange.
///
/// The two halves are unrelated h2 streams joined here: reads come from the
/// response body, writes go to the request body. Nothing is buffered across
/// them.
pub struct TunnelStream {
    reader: H2StreamReader,
    writer: H2StreamWriter,
}

impl TunnelStream {
    pub(crate) fn new(recv_stream: RecvStream, send_stream: SendStream<Bytes>) -> Self {
        TunnelStream {
            reader: H2StreamReader::new(recv_stream),
            writer: H2StreamWriter::new(send_stream),
        }
    }
}

impl AsyncRead for TunnelStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for TunnelStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.writer).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.writer).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.writer).poll_shutdown(cx)
    }
}
