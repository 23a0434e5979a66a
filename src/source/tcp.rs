//! TCP fallback line source
//!
//! Listens on the configured address and treats the first accepted client as
//! the byte source. Closing drops the client but keeps the listener bound, so
//! a reconnect simply waits for the next client.

use super::line_buffer::LineBuffer;
use super::LineSource;
use crate::config::TcpSourceConfig;
use crate::error::{PortLogError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

/// Poll step while waiting for a client to connect
const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// Line source backed by one accepted TCP client
pub struct TcpLineSource {
    config: TcpSourceConfig,
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
    buffer: LineBuffer,
    scratch: [u8; 1024],
}

impl TcpLineSource {
    pub fn new(config: TcpSourceConfig) -> Self {
        Self {
            config,
            listener: None,
            stream: None,
            peer: None,
            buffer: LineBuffer::new(),
            scratch: [0u8; 1024],
        }
    }

    /// Bind the listener now and return the bound address
    ///
    /// Useful with port 0 to learn the assigned port before the first open.
    pub fn bind(&mut self) -> Result<SocketAddr> {
        if let Some(listener) = &self.listener {
            return Ok(listener.local_addr()?);
        }

        let listener = TcpListener::bind(&self.config.bind_address)
            .map_err(|e| PortLogError::unavailable(&self.config.bind_address, e))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        tracing::info!("Listening for a TCP client on {}", addr);
        self.listener = Some(listener);
        Ok(addr)
    }

    /// Address of the currently connected client
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn disconnected(&mut self, reason: impl ToString) -> PortLogError {
        if let Some(peer) = self.peer.take() {
            tracing::info!("{} disconnected", peer);
        }
        self.stream = None;
        PortLogError::disconnected(&self.config.bind_address, reason)
    }
}

impl LineSource for TcpLineSource {
    fn identity(&self) -> &str {
        &self.config.bind_address
    }

    fn open(&mut self) -> Result<()> {
        self.open_until(&crossbeam_channel::never())
    }

    fn open_until(&mut self, stop: &Receiver<()>) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        self.bind()?;

        let deadline = Instant::now() + Duration::from_millis(self.config.accept_timeout_ms);
        let Some(listener) = self.listener.as_ref() else {
            return Err(PortLogError::unavailable(&self.config.bind_address, "listener not bound"));
        };

        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    let read_timeout = Duration::from_millis(self.config.read_timeout_ms);
                    stream.set_nonblocking(false)?;
                    stream.set_read_timeout(Some(read_timeout))?;
                    stream.set_write_timeout(Some(read_timeout))?;
                    tracing::info!("{} is now connected", peer);

                    self.buffer.clear();
                    self.stream = Some(stream);
                    self.peer = Some(peer);
                    return Ok(());
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(PortLogError::unavailable(
                            &self.config.bind_address,
                            "no client connected",
                        ));
                    }
                    if let Err(RecvTimeoutError::Disconnected) =
                        stop.recv_timeout(remaining.min(ACCEPT_POLL))
                    {
                        return Err(PortLogError::unavailable(
                            &self.config.bind_address,
                            "stopped while waiting for a client",
                        ));
                    }
                }
                Err(e) => return Err(PortLogError::unavailable(&self.config.bind_address, e)),
            }
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.peer = None;
        self.buffer.clear();
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn read_line(&mut self) -> Result<String> {
        if let Some(line) = self.buffer.next_line() {
            return Ok(line);
        }

        let Some(stream) = self.stream.as_mut() else {
            return Err(PortLogError::disconnected(&self.config.bind_address, "no client"));
        };

        match stream.read(&mut self.scratch) {
            Ok(0) => Err(self.disconnected("peer closed the connection")),
            Ok(n) => {
                self.buffer.feed(&self.scratch[..n]);
                self.buffer.next_line().ok_or(PortLogError::ReadTimeout)
            }
            Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(PortLogError::ReadTimeout)
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => Err(PortLogError::ReadTimeout),
            Err(e) => Err(self.disconnected(e)),
        }
    }

    fn write_line(&mut self, text: &str) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(PortLogError::disconnected(&self.config.bind_address, "no client"));
        };

        let result = stream
            .write_all(text.as_bytes())
            .and_then(|_| stream.write_all(b"\n"))
            .and_then(|_| stream.flush());
        result.map_err(|e| self.disconnected(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::thread;

    fn local_config() -> TcpSourceConfig {
        TcpSourceConfig {
            bind_address: "127.0.0.1:0".to_string(),
            accept_timeout_ms: 2_000,
            read_timeout_ms: 50,
        }
    }

    #[test]
    fn test_open_without_client_is_unavailable() {
        let mut source = TcpLineSource::new(TcpSourceConfig {
            accept_timeout_ms: 30,
            ..local_config()
        });
        let err = source.open().unwrap_err();
        assert!(matches!(err, PortLogError::SourceUnavailable { .. }));
        assert!(!source.is_open());
    }

    #[test]
    fn test_open_gives_up_when_stopped() {
        let mut source = TcpLineSource::new(TcpSourceConfig {
            accept_timeout_ms: 4_000,
            ..local_config()
        });
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            drop(stop_tx);
        });

        let started = Instant::now();
        let err = source.open_until(&stop_rx).unwrap_err();
        stopper.join().unwrap();

        assert!(matches!(err, PortLogError::SourceUnavailable { .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!source.is_open());
    }

    #[test]
    fn test_reads_lines_from_client_then_disconnects() {
        let mut source = TcpLineSource::new(local_config());
        let addr = source.bind().unwrap();

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(b"23.4\r\n-1.").unwrap();
            stream.flush().unwrap();
            thread::sleep(Duration::from_millis(20));
            stream.write_all(b"2\n").unwrap();
        });

        source.open().unwrap();
        assert!(source.is_open());
        assert!(source.peer().is_some());

        let mut lines = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            match source.read_line() {
                Ok(line) => lines.push(line),
                Err(PortLogError::ReadTimeout) => continue,
                Err(PortLogError::SourceDisconnected { .. }) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        client.join().unwrap();

        assert_eq!(lines, vec!["23.4".to_string(), "-1.2".to_string()]);
        assert!(!source.is_open());
    }

    #[test]
    fn test_write_line_reaches_client() {
        let mut source = TcpLineSource::new(local_config());
        let addr = source.bind().unwrap();

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            let mut received = String::new();
            stream.read_to_string(&mut received).unwrap();
            received
        });

        source.open().unwrap();
        source.write_line("RESET").unwrap();
        source.close();

        assert_eq!(client.join().unwrap(), "RESET\n");
    }
}
