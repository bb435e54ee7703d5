//! Stream transports behind an [`Address`].

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::addr::Address;
use crate::error::{Error, Result};

/// A bound session endpoint.
///
/// Dropping a unix listener removes its socket file, so the address can be
/// bound again.
#[derive(Debug)]
pub enum Listener {
    #[cfg(unix)]
    Unix {
        listener: UnixListener,
        path: std::path::PathBuf,
    },
    Tcp(TcpListener),
}

impl Listener {
    /// Bind `address`, clearing a stale socket file left by a dead server.
    pub async fn bind(address: &Address) -> Result<Self> {
        match address {
            #[cfg(unix)]
            Address::Unix(path) => {
                if let Some(is_socket) = socket_file(path)? {
                    if !is_socket {
                        return Err(Error::Io(io::Error::new(
                            io::ErrorKind::AlreadyExists,
                            format!("{} exists and is not a socket", path.display()),
                        )));
                    }
                    if UnixStream::connect(path).await.is_ok() {
                        return Err(Error::AddressInUse(address.clone()));
                    }
                    tracing::debug!("Removing stale socket {}", path.display());
                    std::fs::remove_file(path)?;
                }
                let listener = UnixListener::bind(path).map_err(|e| bind_error(address, e))?;
                Ok(Self::Unix {
                    listener,
                    path: path.clone(),
                })
            }
            #[cfg(not(unix))]
            Address::Unix(_) => Err(Error::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix socket addresses are not supported on this platform",
            ))),
            Address::Tcp(addr) => {
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|e| bind_error(address, e))?;
                Ok(Self::Tcp(listener))
            }
        }
    }

    /// Wait for the next client.
    pub async fn accept(&self) -> Result<Connection> {
        match self {
            #[cfg(unix)]
            Self::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                Ok(Connection::Unix(stream))
            }
            Self::Tcp(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(Connection::Tcp(stream))
            }
        }
    }

    /// The address actually bound. For TCP this carries the assigned port.
    pub fn local_address(&self) -> Result<Address> {
        match self {
            #[cfg(unix)]
            Self::Unix { path, .. } => Ok(Address::Unix(path.clone())),
            Self::Tcp(listener) => Ok(Address::Tcp(listener.local_addr()?)),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Self::Unix { path, .. } = self {
            match std::fs::remove_file(&*path) {
                Ok(()) => tracing::debug!("Removed socket {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove socket {}: {}", path.display(), e),
            }
        }
    }
}

/// Whether something sits at `path`, and if so whether it is a socket.
/// Symlinks are not followed.
#[cfg(unix)]
fn socket_file(path: &std::path::Path) -> Result<Option<bool>> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::symlink_metadata(path) {
        Ok(metadata) => Ok(Some(metadata.file_type().is_socket())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

fn bind_error(address: &Address, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::AddrInUse {
        Error::AddressInUse(address.clone())
    } else {
        Error::Io(e)
    }
}

/// Connect to a session, mapping "nobody listening" to
/// [`Error::ConnectionRefused`].
pub async fn connect(address: &Address) -> Result<Connection> {
    let refused = |e: io::Error| match e.kind() {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => Error::ConnectionRefused {
            address: address.clone(),
        },
        _ => Error::Io(e),
    };
    match address {
        #[cfg(unix)]
        Address::Unix(path) => UnixStream::connect(path)
            .await
            .map(Connection::Unix)
            .map_err(refused),
        #[cfg(not(unix))]
        Address::Unix(_) => Err(Error::ConnectionRefused {
            address: address.clone(),
        }),
        Address::Tcp(addr) => TcpStream::connect(addr)
            .await
            .map(Connection::Tcp)
            .map_err(refused),
    }
}

/// One accepted or established stream.
#[derive(Debug)]
pub enum Connection {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            Self::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            #[cfg(unix)]
            Self::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            Self::Unix(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            Self::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::allocate_in;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_connect_without_listener_is_refused() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let address = allocate_in(temp.path()).unwrap();
        let err = connect(&address).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionRefused { .. }));
    }

    #[tokio::test]
    async fn test_tcp_bind_reports_assigned_port() {
        let listener = Listener::bind(&Address::parse("127.0.0.1:0")).await.unwrap();
        let Address::Tcp(addr) = listener.local_address().unwrap() else {
            panic!("expected tcp address");
        };
        assert_ne!(addr.port(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_roundtrip_and_cleanup() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let address = allocate_in(temp.path()).unwrap();
        let path = address.socket_path().unwrap().to_path_buf();

        let listener = Listener::bind(&address).await.unwrap();
        assert!(path.exists());

        let client = tokio::spawn({
            let address = address.clone();
            async move {
                let mut conn = connect(&address).await.unwrap();
                conn.write_all(b"ping").await.unwrap();
                conn.shutdown().await.unwrap();
            }
        });
        let mut conn = listener.accept().await.unwrap();
        let mut received = Vec::new();
        conn.read_to_end(&mut received).await.unwrap();
        client.await.unwrap();
        assert_eq!(received, b"ping");

        drop(listener);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stale_socket_is_replaced_but_live_one_is_not() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let address = allocate_in(temp.path()).unwrap();
        let path = address.socket_path().unwrap().to_path_buf();

        // A socket file with nobody behind it
        let stale = std::os::unix::net::UnixListener::bind(&path).unwrap();
        drop(stale);
        assert!(path.exists());
        let live = Listener::bind(&address).await.unwrap();

        let err = Listener::bind(&address).await.unwrap_err();
        assert!(matches!(err, Error::AddressInUse(_)));
        drop(live);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_regular_file_at_address_is_left_alone() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let address = allocate_in(temp.path()).unwrap();
        let path = address.socket_path().unwrap().to_path_buf();
        std::fs::write(&path, "keep me").unwrap();

        let err = Listener::bind(&address).await.unwrap_err();
        assert!(matches!(&err, Error::Io(e) if e.kind() == io::ErrorKind::AlreadyExists));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");
    }
}
