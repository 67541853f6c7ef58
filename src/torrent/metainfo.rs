use super::Pieces;
use crate::bencode::{encode, BencodeValue};
use crate::error::{BittorrentError, Result};
use crate::identity;

fn malformed(msg: impl Into<String>) -> BittorrentError {
    BittorrentError::MalformedEncoding(msg.into())
}

/// Information about the torrent contents (single-file layout)
#[derive(Debug, Clone)]
pub struct TorrentInfo {
    /// Suggested name for the file
    pub name: String,
    /// Total length of the file in bytes
    pub length: u64,
    /// Number of bytes in each piece (all but possibly the last)
    pub piece_length: u64,
    /// SHA1 hashes of all pieces
    pub pieces: Pieces,
}

impl TorrentInfo {
    fn from_bencode(value: &BencodeValue) -> Result<Self> {
        if value.as_dict().is_none() {
            return Err(malformed("'info' must be a dict"));
        }

        let name = value
            .dict_get_str(b"name")
            .ok_or_else(|| malformed("Missing or invalid 'info.name'"))?
            .to_string();

        let length = value
            .dict_get_int(b"length")
            .ok_or_else(|| malformed("Missing or invalid 'info.length'"))?;
        let length = u64::try_from(length)
            .map_err(|_| malformed(format!("Negative 'info.length': {}", length)))?;

        let piece_length = value
            .dict_get_int(b"piece length")
            .ok_or_else(|| malformed("Missing or invalid 'info.piece length'"))?;
        if piece_length <= 0 || piece_length > i64::from(u32::MAX) {
            return Err(malformed(format!(
                "'info.piece length' out of range: {}",
                piece_length
            )));
        }
        let piece_length = piece_length as u64;

        let pieces_bytes = value
            .dict_get_bytes(b"pieces")
            .ok_or_else(|| malformed("Missing or invalid 'info.pieces'"))?;
        let pieces = Pieces::from_bytes(pieces_bytes)?;

        let expected = length.div_ceil(piece_length);
        if pieces.len() as u64 != expected {
            return Err(malformed(format!(
                "{} piece hashes for {} bytes in pieces of {} (expected {})",
                pieces.len(),
                length,
                piece_length,
                expected
            )));
        }

        Ok(TorrentInfo {
            name,
            length,
            piece_length,
            pieces,
        })
    }
}

/// Top-level metainfo structure from a .torrent file
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// URL of the tracker
    pub announce: String,
    /// Information about the torrent contents
    pub info: TorrentInfo,
    /// Canonical bencoding of the info dictionary
    pub info_bencoded: Vec<u8>,
    /// SHA1 hash of `info_bencoded`
    pub info_hash: [u8; 20],
    /// `info_hash` percent-encoded for tracker requests
    pub info_hash_urlencoded: String,
}

impl Metainfo {
    pub fn from_bencode(value: &BencodeValue) -> Result<Self> {
        if value.as_dict().is_none() {
            return Err(malformed("Torrent must be a dict"));
        }

        let announce = value
            .dict_get_str(b"announce")
            .ok_or_else(|| malformed("Missing or invalid 'announce'"))?
            .to_string();

        let info_value = value
            .dict_get(b"info")
            .ok_or_else(|| malformed("Missing 'info'"))?;
        let info = TorrentInfo::from_bencode(info_value)?;

        // The identity comes from re-encoding the decoded dict, never from the
        // file bytes.
        let info_bencoded = encode(info_value);
        let info_hash = identity::raw_hash(&info_bencoded);
        let info_hash_urlencoded = identity::percent_encode(&info_hash);

        Ok(Metainfo {
            announce,
            info,
            info_bencoded,
            info_hash,
            info_hash_urlencoded,
        })
    }

    /// Get the info hash as a hex string
    pub fn info_hash_hex(&self) -> String {
        identity::hex(&self.info_hash)
    }

    pub fn num_pieces(&self) -> u32 {
        self.info.pieces.len() as u32
    }

    /// Expected size of a piece: `piece_length` for all but the last one,
    /// the remainder of the file for the last.
    pub fn piece_size(&self, piece_index: u32) -> Result<u32> {
        let num_pieces = self.num_pieces();
        if piece_index >= num_pieces {
            return Err(BittorrentError::OutOfRange(format!(
                "piece index {} (torrent has {} pieces)",
                piece_index, num_pieces
            )));
        }

        if piece_index < num_pieces - 1 {
            return Ok(self.info.piece_length as u32);
        }

        let full_before_last = self.info.piece_length * u64::from(num_pieces - 1);
        Ok((self.info.length - full_before_last) as u32)
    }

    /// Byte offset of a piece within the file
    pub fn piece_offset(&self, piece_index: u32) -> u64 {
        self.info.piece_length * u64::from(piece_index)
    }
}
