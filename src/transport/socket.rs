//! Non-blocking TCP stream for the client loop.
//!
//! Thin wrapper around [`mio::net::TcpStream`]. The connect is started in
//! non-blocking mode; completion is learned by probing the socket once the
//! poll reports it writable.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, ToSocketAddrs};

use bytes::{Buf, BytesMut};
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};

const READ_CHUNK: usize = 4096;

/// Result of probing a socket whose connect was in flight.
#[derive(Debug)]
pub enum ConnectProbe {
    Connected,
    Pending,
    Failed(io::Error),
}

/// Result of draining the readable side of the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Number of bytes appended to the inbound buffer (may be zero on a
    /// spurious wakeup). The socket is drained.
    Data(usize),
    /// The read limit was reached before the socket was drained; more bytes
    /// may be waiting without a further readiness event.
    Limited(usize),
    /// The peer closed its side of the stream.
    Closed,
}

/// Resolves `address:port` to the first socket address.
pub fn resolve(address: &str, port: u16) -> io::Result<SocketAddr> {
    (address, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "address resolved to nothing"))
}

#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    connected: bool,
    interest: Option<Interest>,
}

impl Connection {
    /// Starts a non-blocking connect to `addr`.
    pub fn open(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Ok(Self {
            stream,
            connected: false,
            interest: None,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Registers or re-registers the stream with `interest`, skipping the
    /// syscall when nothing changed.
    pub fn update_interest(
        &mut self,
        registry: &Registry,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        match self.interest {
            Some(current) if current == interest => Ok(()),
            Some(_) => {
                registry.reregister(&mut self.stream, token, interest)?;
                self.interest = Some(interest);
                Ok(())
            }
            None => {
                registry.register(&mut self.stream, token, interest)?;
                self.interest = Some(interest);
                Ok(())
            }
        }
    }

    pub fn deregister(&mut self, registry: &Registry) {
        if self.interest.take().is_some() {
            let _ = registry.deregister(&mut self.stream);
        }
    }

    /// Checks the socket error state after a writable event while the
    /// connect is outstanding.
    pub fn probe(&mut self) -> ConnectProbe {
        match self.stream.take_error() {
            Ok(Some(err)) | Err(err) => return ConnectProbe::Failed(err),
            Ok(None) => {}
        }
        match self.stream.peer_addr() {
            Ok(_) => {
                self.connected = true;
                ConnectProbe::Connected
            }
            Err(err) if err.kind() == ErrorKind::NotConnected => ConnectProbe::Pending,
            Err(err) => ConnectProbe::Failed(err),
        }
    }

    /// Reads what is available into `buf`, stopping after roughly `limit`
    /// bytes.
    pub fn read_available(&mut self, buf: &mut BytesMut, limit: usize) -> io::Result<ReadOutcome> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut total = 0;
        loop {
            if total >= limit {
                return Ok(ReadOutcome::Limited(total));
            }
            let want = READ_CHUNK.min(limit - total);
            match self.stream.read(&mut chunk[..want]) {
                Ok(0) => return Ok(ReadOutcome::Closed),
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(ReadOutcome::Data(total))
    }

    /// Writes as much of `buf` as the socket accepts, consuming what was sent.
    pub fn write_pending(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        let mut total = 0;
        while !buf.is_empty() {
            match self.stream.write(buf) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => {
                    buf.advance(n);
                    total += n;
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(total)
    }

    /// Half-closes the write side; a socket that never connected is fine.
    pub fn shutdown(&self) {
        if let Err(err) = self.stream.shutdown(Shutdown::Write) {
            if err.kind() != ErrorKind::NotConnected {
                tracing::debug!("socket shutdown failed: {err}");
            }
        }
    }
}
