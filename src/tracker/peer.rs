use crate::error::{BittorrentError, Result};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// A remote endpoint: host name or dotted-quad plus port
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Peer {
    pub host: String,
    pub port: u16,
}

impl Peer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a peer from compact format (6 bytes: 4 IP + 2 port)
    fn from_compact(data: &[u8]) -> Self {
        let ip = Ipv4Addr::new(data[0], data[1], data[2], data[3]);
        let port = u16::from_be_bytes([data[4], data[5]]);
        Self::new(ip.to_string(), port)
    }

    /// Parse multiple peers from compact format
    pub fn from_compact_list(data: &[u8]) -> Result<Vec<Self>> {
        if data.len() % 6 != 0 {
            return Err(BittorrentError::MalformedEncoding(format!(
                "compact peer list length {} is not a multiple of 6",
                data.len()
            )));
        }

        Ok(data.chunks_exact(6).map(Self::from_compact).collect())
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parses `host:port`, splitting on the last colon.
impl FromStr for Peer {
    type Err = BittorrentError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || BittorrentError::InvalidArgument(format!("invalid peer address: {:?}", s));

        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;

        Ok(Self::new(host, port))
    }
}
