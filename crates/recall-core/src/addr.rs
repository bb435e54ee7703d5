//! Session address allocation.
//!
//! An address is the only thing a controller has to remember about a
//! session: the server binds it and every client connects to it. Two forms
//! exist:
//!
//! ```text
//! /run/user/1000/recall_3f9a1c0b7e2d_4711_6a0f2c1e.sock   unix socket path
//! 127.0.0.1:40213                                          loopback TCP endpoint
//! ```
//!
//! Any string that parses as a socket address is TCP, anything else is
//! treated as a unix socket path.

use std::convert::Infallible;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// How many candidates the allocator draws before giving up.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 16;

const SOCKET_PREFIX: &str = "recall_";
const SOCKET_SUFFIX: &str = ".sock";

/// Endpoint identifier of one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// Filesystem-backed local socket.
    Unix(PathBuf),
    /// Loopback stream socket.
    Tcp(SocketAddr),
}

impl Address {
    /// Parse an address string. Never fails: non socket-address strings are paths.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match s.parse::<SocketAddr>() {
            Ok(addr) => Self::Tcp(addr),
            Err(_) => Self::Unix(PathBuf::from(s)),
        }
    }

    /// Socket path, for unix addresses.
    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            Self::Unix(path) => Some(path),
            Self::Tcp(_) => None,
        }
    }

    /// Human-readable transport name, used in logs.
    pub fn transport(&self) -> &'static str {
        match self {
            Self::Unix(_) => "unix socket",
            Self::Tcp(_) => "tcp",
        }
    }
}

impl FromStr for Address {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "{}", path.display()),
            Self::Tcp(addr) => write!(f, "{addr}"),
        }
    }
}

/// Which kind of address to allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Unix,
    Tcp,
}

impl Default for AddressKind {
    fn default() -> Self {
        if cfg!(unix) { Self::Unix } else { Self::Tcp }
    }
}

/// Allocate a fresh address of the platform's preferred kind.
pub fn allocate() -> Result<Address> {
    allocate_kind(AddressKind::default())
}

/// Allocate a fresh address of the given kind.
pub fn allocate_kind(kind: AddressKind) -> Result<Address> {
    match kind {
        AddressKind::Unix => allocate_in(&session_dir()),
        AddressKind::Tcp => allocate_tcp(),
    }
}

/// Allocate a unix socket path inside `dir`.
///
/// The name combines a random token with the allocating process id and the
/// allocation time in seconds, so two controllers allocating in the same
/// instant still get distinct paths.
pub fn allocate_in(dir: &Path) -> Result<Address> {
    let pid = std::process::id();
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    for _ in 0..MAX_ALLOCATION_ATTEMPTS {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let name = format!(
            "{SOCKET_PREFIX}{}_{pid}_{secs:x}{SOCKET_SUFFIX}",
            &token[..12]
        );
        let candidate = dir.join(name);
        if !candidate.exists() {
            return Ok(Address::Unix(candidate));
        }
        tracing::debug!("Address candidate {} already taken", candidate.display());
    }
    Err(Error::AllocationExhausted {
        attempts: MAX_ALLOCATION_ATTEMPTS,
    })
}

/// Allocate a loopback TCP endpoint by asking the OS for a free port.
///
/// The temporary listener is dropped before returning, so the port is free for
/// the server to bind.
pub fn allocate_tcp() -> Result<Address> {
    for _ in 0..MAX_ALLOCATION_ATTEMPTS {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).and_then(|l| l.local_addr()) {
            Ok(addr) if addr.port() != 0 => return Ok(Address::Tcp(addr)),
            Ok(_) => continue,
            Err(e) => tracing::debug!("Port lookup failed: {}", e),
        }
    }
    Err(Error::AllocationExhausted {
        attempts: MAX_ALLOCATION_ATTEMPTS,
    })
}

/// Per-user directory that holds session sockets.
///
/// Prefers the user's runtime directory, falling back to the temp dir.
pub fn session_dir() -> PathBuf {
    dirs::runtime_dir()
        .filter(|dir| dir.is_dir())
        .unwrap_or_else(std::env::temp_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_tcp_and_path() {
        assert_eq!(
            Address::parse("127.0.0.1:4000"),
            Address::Tcp("127.0.0.1:4000".parse().unwrap())
        );
        assert_eq!(
            Address::parse("/tmp/recall_x.sock"),
            Address::Unix(PathBuf::from("/tmp/recall_x.sock"))
        );
        // Host names are not socket addresses
        assert!(matches!(Address::parse("localhost:4000"), Address::Unix(_)));
    }

    #[test]
    fn test_display_roundtrips() {
        for raw in ["127.0.0.1:9", "/tmp/a b/recall.sock"] {
            assert_eq!(Address::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn test_allocate_in_is_unique() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let a = allocate_in(temp.path()).unwrap();
        let b = allocate_in(temp.path()).unwrap();
        assert_ne!(a, b);

        let path = a.socket_path().unwrap();
        assert!(path.starts_with(temp.path()));
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("recall_"));
        assert!(name.ends_with(".sock"));
        assert!(name.contains(&std::process::id().to_string()));

        let stem = name.trim_end_matches(".sock");
        let parts: Vec<&str> = stem.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1].len(), 12);
        assert!(u64::from_str_radix(parts[3], 16).unwrap() > 0);
    }

    #[test]
    fn test_allocate_in_missing_dir_still_yields_path() {
        // Existence is only checked for collisions; binding reports the real error.
        let addr = allocate_in(Path::new("/nonexistent/recall-dir")).unwrap();
        assert!(addr.socket_path().is_some());
    }

    #[test]
    fn test_allocate_tcp_returns_loopback_port() {
        let addr = allocate_tcp().unwrap();
        match addr {
            Address::Tcp(sock) => {
                assert!(sock.ip().is_loopback());
                assert_ne!(sock.port(), 0);
                // The temporary listener was released
                TcpListener::bind(sock).expect("allocated port should be free");
            }
            Address::Unix(_) => panic!("expected tcp address"),
        }
    }

    #[test]
    fn test_with_hint_names_category() {
        let err = Error::AllocationExhausted { attempts: 16 };
        assert!(err.with_hint().contains("allocation exhausted"));
        assert!(err.with_hint().contains("hint:"));
    }
}
