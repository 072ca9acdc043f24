use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::TransportError;

/// Local port scrcpy clients conventionally forward the device socket to.
pub const DEFAULT_PORT: u16 = 27183;

/// A locally reachable address of an already-forwarded mirroring socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port` over TCP. The host may be a name or a literal address.
    Tcp { host: String, port: u16 },
    /// Filesystem path of a Unix domain socket.
    Unix(PathBuf),
}

impl Endpoint {
    /// TCP endpoint on the loopback interface.
    pub fn localhost(port: u16) -> Self {
        Self::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Self::Tcp { .. } => "tcp",
            Self::Unix(_) => "unix-domain-socket",
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::localhost(DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } if host.contains(':') => write!(f, "tcp:[{host}]:{port}"),
            Self::Tcp { host, port } => write!(f, "tcp:{host}:{port}"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "empty endpoint"));
        }

        if let Some(path) = trimmed.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(invalid(input, "missing socket path"));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }

        let addr = trimmed.strip_prefix("tcp:").unwrap_or(trimmed);

        // A bare port number means the conventional loopback forward.
        if let Ok(port) = addr.parse::<u16>() {
            return Ok(Self::localhost(port));
        }

        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| invalid(input, "expected HOST:PORT"))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| invalid(input, "port is not a number in 0-65535"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid(input, "missing host"));
        }

        Ok(Self::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

fn invalid(input: &str, reason: &'static str) -> TransportError {
    TransportError::InvalidEndpoint {
        input: input.to_string(),
        reason,
    }
}
