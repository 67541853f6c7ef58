use crate::error::Result;
use crate::identity::percent_encode;
use url::Url;

/// Request parameters for tracker communication
#[derive(Debug, Clone)]
pub struct TrackerRequest {
    /// SHA1 hash of the info dictionary
    pub info_hash: [u8; 20],
    /// Unique peer ID
    pub peer_id: [u8; 20],
    /// Port this peer is listening on
    pub port: u16,
    /// Total amount uploaded
    pub uploaded: u64,
    /// Total amount downloaded
    pub downloaded: u64,
    /// Number of bytes left to download
    pub left: u64,
}

impl TrackerRequest {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20], port: u16, left: u64) -> Self {
        Self {
            info_hash,
            peer_id,
            port,
            uploaded: 0,
            downloaded: 0,
            left,
        }
    }

    /// Query string in the fixed order trackers expect. Binary fields are
    /// percent-encoded byte by byte, so no further escaping is applied.
    pub fn to_query(&self) -> String {
        format!(
            "info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1&event=started",
            percent_encode(&self.info_hash),
            percent_encode(&self.peer_id),
            self.port,
            self.uploaded,
            self.downloaded,
            self.left,
        )
    }

    /// Full announce URL
    pub fn url(&self, announce: &str) -> Result<Url> {
        let separator = if announce.contains('?') { '&' } else { '?' };
        let url = Url::parse(&format!("{}{}{}", announce, separator, self.to_query()))?;
        Ok(url)
    }
}
