use super::Peer;
use crate::bencode::BencodeValue;
use crate::error::{BittorrentError, Result};

/// Response from a tracker
#[derive(Debug, Clone)]
pub struct TrackerResponse {
    /// Interval in seconds to wait before next request
    pub interval: Option<u64>,
    /// List of peers
    pub peers: Vec<Peer>,
}

impl TrackerResponse {
    pub fn from_bencode(value: &BencodeValue) -> Result<Self> {
        if value.as_dict().is_none() {
            return Err(BittorrentError::MalformedEncoding(
                "Tracker response must be a dict".to_string(),
            ));
        }

        if let Some(failure) = value.dict_get(b"failure reason") {
            let reason = failure
                .as_bytes()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_else(|| "Unknown failure".to_string());
            return Err(BittorrentError::TrackerFailure(reason));
        }

        let interval = value
            .dict_get_int(b"interval")
            .and_then(|i| u64::try_from(i).ok());

        let peers = match value.dict_get(b"peers") {
            None => Vec::new(),
            Some(peers) => {
                let compact = peers.as_bytes().ok_or_else(|| {
                    BittorrentError::MalformedEncoding(
                        "'peers' must be a compact byte string".to_string(),
                    )
                })?;
                Peer::from_compact_list(compact)?
            }
        };

        Ok(TrackerResponse { interval, peers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::decode;

    #[test]
    fn test_compact_response() {
        let raw = b"d8:intervali60e5:peers12:\x7f\x00\x00\x01\x1a\xe1\x0a\x00\x00\x02\x00\x50e";
        let response = TrackerResponse::from_bencode(&decode(raw).unwrap()).unwrap();

        assert_eq!(response.interval, Some(60));
        assert_eq!(
            response.peers,
            vec![Peer::new("127.0.0.1", 6881), Peer::new("10.0.0.2", 80)]
        );
    }

    #[test]
    fn test_optional_fields() {
        let response = TrackerResponse::from_bencode(&decode(b"de").unwrap()).unwrap();
        assert_eq!(response.interval, None);
        assert!(response.peers.is_empty());
    }

    #[test]
    fn test_failure_reason() {
        let raw = b"d14:failure reason17:torrent not founde";
        let err = TrackerResponse::from_bencode(&decode(raw).unwrap()).unwrap_err();
        assert!(matches!(err, BittorrentError::TrackerFailure(ref r) if r == "torrent not found"));
    }

    #[test]
    fn test_bad_peers() {
        let short = decode(b"d5:peers5:abcdee").unwrap();
        assert!(matches!(
            TrackerResponse::from_bencode(&short),
            Err(BittorrentError::MalformedEncoding(_))
        ));

        let listed = decode(b"d5:peerslee").unwrap();
        assert!(matches!(
            TrackerResponse::from_bencode(&listed),
            Err(BittorrentError::MalformedEncoding(_))
        ));
    }
}
