use std::io::{self, Cursor, ErrorKind, Read};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// An ordered, reliable, blocking byte channel the protocol reader consumes.
///
/// Only [`Read`] is required. Sockets additionally support a bounded read
/// wait (used for the optional probe byte) and closing from another thread
/// (used for cancellation). In-memory sources keep the defaults.
pub trait ByteSource: Read {
    /// Bound (or unbound with `None`) the wait of subsequent reads.
    ///
    /// Returns `ErrorKind::Unsupported` when the source cannot bound reads.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        let _ = timeout;
        Err(io::Error::new(
            ErrorKind::Unsupported,
            "byte source does not support read timeouts",
        ))
    }

    /// Release the underlying channel. Calling it more than once is harmless.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// A handle that can close this source from another thread, unblocking
    /// an outstanding read.
    fn closer(&self) -> io::Result<Option<SourceCloser>> {
        Ok(None)
    }
}

/// A connected mirroring stream. Implements [`Read`] and [`ByteSource`].
///
/// Wraps a TCP stream (the usual forwarded port) or, on Unix, a Unix domain
/// socket stream.
pub struct MirrorStream {
    inner: MirrorStreamInner,
}

enum MirrorStreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl MirrorStream {
    /// Connect to an endpoint (blocking, no connect timeout).
    pub fn connect(endpoint: &Endpoint) -> Result<Self> {
        Self::connect_inner(endpoint, None)
    }

    /// Connect to an endpoint, bounding each TCP connect attempt.
    pub fn connect_timeout(endpoint: &Endpoint, timeout: Duration) -> Result<Self> {
        Self::connect_inner(endpoint, Some(timeout))
    }

    fn connect_inner(endpoint: &Endpoint, timeout: Option<Duration>) -> Result<Self> {
        let connect_err = |source: io::Error| TransportError::Connect {
            endpoint: endpoint.to_string(),
            source,
        };

        match endpoint {
            Endpoint::Tcp { host, port } => {
                let stream = match timeout {
                    None => TcpStream::connect((host.as_str(), *port)).map_err(connect_err)?,
                    Some(timeout) => {
                        let addrs = (host.as_str(), *port)
                            .to_socket_addrs()
                            .map_err(connect_err)?;
                        let mut last_err = io::Error::new(
                            ErrorKind::AddrNotAvailable,
                            "host resolved to no addresses",
                        );
                        let mut connected = None;
                        for addr in addrs {
                            match TcpStream::connect_timeout(&addr, timeout) {
                                Ok(stream) => {
                                    connected = Some(stream);
                                    break;
                                }
                                Err(err) => last_err = err,
                            }
                        }
                        connected.ok_or_else(|| connect_err(last_err))?
                    }
                };
                debug!(%endpoint, "connected to tcp endpoint");
                Ok(Self::from_tcp(stream))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream =
                    std::os::unix::net::UnixStream::connect(path).map_err(connect_err)?;
                debug!(%endpoint, "connected to unix domain socket");
                Ok(Self::from_unix(stream))
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(TransportError::Unsupported(endpoint.to_string())),
        }
    }

    /// Wrap an already-connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: MirrorStreamInner::Tcp(stream),
        }
    }

    /// Wrap an already-connected Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: MirrorStreamInner::Unix(stream),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            MirrorStreamInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
            #[cfg(unix)]
            MirrorStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }

    /// Human-readable peer description for logs.
    pub fn peer_label(&self) -> String {
        match &self.inner {
            MirrorStreamInner::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| format!("tcp:{addr}"))
                .unwrap_or_else(|_| "tcp:<disconnected>".to_string()),
            #[cfg(unix)]
            MirrorStreamInner::Unix(stream) => stream
                .peer_addr()
                .ok()
                .and_then(|addr| addr.as_pathname().map(|p| format!("unix:{}", p.display())))
                .unwrap_or_else(|| "unix:<unnamed>".to_string()),
        }
    }
}

impl Read for MirrorStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            MirrorStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            MirrorStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl ByteSource for MirrorStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        match &mut self.inner {
            MirrorStreamInner::Tcp(stream) => ByteSource::set_read_timeout(stream, timeout),
            #[cfg(unix)]
            MirrorStreamInner::Unix(stream) => ByteSource::set_read_timeout(stream, timeout),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match &mut self.inner {
            MirrorStreamInner::Tcp(stream) => ByteSource::close(stream),
            #[cfg(unix)]
            MirrorStreamInner::Unix(stream) => ByteSource::close(stream),
        }
    }

    fn closer(&self) -> io::Result<Option<SourceCloser>> {
        match &self.inner {
            MirrorStreamInner::Tcp(stream) => ByteSource::closer(stream),
            #[cfg(unix)]
            MirrorStreamInner::Unix(stream) => ByteSource::closer(stream),
        }
    }
}

impl std::fmt::Debug for MirrorStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            MirrorStreamInner::Tcp(_) => f.debug_struct("MirrorStream").field("type", &"tcp").finish(),
            #[cfg(unix)]
            MirrorStreamInner::Unix(_) => {
                f.debug_struct("MirrorStream").field("type", &"unix").finish()
            }
        }
    }
}

impl ByteSource for TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        ignore_not_connected(self.shutdown(Shutdown::Both))
    }

    fn closer(&self) -> io::Result<Option<SourceCloser>> {
        Ok(Some(SourceCloser {
            inner: CloserInner::Tcp(self.try_clone()?),
        }))
    }
}

#[cfg(unix)]
impl ByteSource for std::os::unix::net::UnixStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        std::os::unix::net::UnixStream::set_read_timeout(self, timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        ignore_not_connected(self.shutdown(Shutdown::Both))
    }

    fn closer(&self) -> io::Result<Option<SourceCloser>> {
        Ok(Some(SourceCloser {
            inner: CloserInner::Unix(self.try_clone()?),
        }))
    }
}

impl<T: AsRef<[u8]>> ByteSource for Cursor<T> {}

impl ByteSource for &[u8] {}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_read_timeout(timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }

    fn closer(&self) -> io::Result<Option<SourceCloser>> {
        (**self).closer()
    }
}

/// Closes a socket-backed [`ByteSource`] from another thread.
///
/// Shutting the socket down makes a blocked read on the owning thread return
/// end-of-data, which is how sessions are cancelled promptly.
#[derive(Debug)]
pub struct SourceCloser {
    inner: CloserInner,
}

#[derive(Debug)]
enum CloserInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl SourceCloser {
    /// Shut down both directions of the underlying socket.
    pub fn close(&self) -> io::Result<()> {
        let result = match &self.inner {
            CloserInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            CloserInner::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        ignore_not_connected(result)
    }
}

fn ignore_not_connected(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    #[test]
    fn connect_tcp_and_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"hello").unwrap();
        });

        let mut stream = MirrorStream::connect(&Endpoint::localhost(port)).unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert!(stream.peer_label().starts_with("tcp:127.0.0.1:"));

        server.join().unwrap();
    }

    #[test]
    fn connect_timeout_reports_refused_endpoint() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let result =
            MirrorStream::connect_timeout(&Endpoint::localhost(port), Duration::from_millis(200));
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    #[cfg(unix)]
    fn connect_unix_socket() {
        let dir = std::env::temp_dir().join(format!("mirrorwire-uds-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("mirror.sock");
        let _ = std::fs::remove_file(&sock_path);
        let listener = std::os::unix::net::UnixListener::bind(&sock_path).unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"uds").unwrap();
        });

        let mut stream = MirrorStream::connect(&Endpoint::Unix(sock_path.clone())).unwrap();
        let mut buf = [0u8; 3];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"uds");

        server.join().unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    #[cfg(unix)]
    fn closer_unblocks_pending_read() {
        let (_peer, local) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut stream = MirrorStream::from_unix(local);
        let closer = stream.closer().unwrap().expect("sockets provide a closer");

        let reader = std::thread::spawn(move || {
            let mut buf = [0u8; 1];
            stream.read(&mut buf).unwrap()
        });

        std::thread::sleep(Duration::from_millis(50));
        closer.close().unwrap();

        assert_eq!(reader.join().unwrap(), 0, "read should observe end-of-data");
    }

    #[test]
    #[cfg(unix)]
    fn close_is_idempotent() {
        let (_peer, local) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut stream = MirrorStream::from_unix(local);
        stream.close().unwrap();
        stream.close().unwrap();
    }

    #[test]
    fn in_memory_sources_reject_timeouts() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3]);
        let err = ByteSource::set_read_timeout(&mut cursor, Some(Duration::from_millis(5)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(cursor.closer().unwrap().is_none());
    }

    #[test]
    fn socket_read_timeout_applies() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = std::thread::spawn(move || listener.accept().unwrap().0);

        let mut stream = MirrorStream::connect(&Endpoint::localhost(port)).unwrap();
        let _server_side = accept.join().unwrap();

        ByteSource::set_read_timeout(&mut stream, Some(Duration::from_millis(20))).unwrap();
        let mut buf = [0u8; 1];
        let err = stream.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::WouldBlock | ErrorKind::TimedOut
        ));
    }
}
