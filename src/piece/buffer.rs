use super::BLOCK_SIZE;
use crate::error::{BittorrentError, Result};
use crate::identity::raw_hash;
use crate::peer::BlockInfo;
use crate::torrent::Metainfo;
use tracing::{debug, warn};

/// The blocks to request for a piece, in ascending offset order. Every block
/// is `BLOCK_SIZE` long except a shorter final one.
pub fn blocks(piece_index: u32, piece_size: u32) -> impl Iterator<Item = BlockInfo> {
    (0..piece_size)
        .step_by(BLOCK_SIZE as usize)
        .map(move |offset| {
            BlockInfo::new(
                piece_index,
                offset,
                std::cmp::min(BLOCK_SIZE, piece_size - offset),
            )
        })
}

/// Fixed-size buffer for one piece, filled in place as blocks arrive.
///
/// Completion is tracked by summing received block lengths. Overlapping or
/// repeated blocks are not de-duplicated, so a peer that resends a block can
/// make the buffer report completion early; the hash check catches that.
pub struct PieceBuffer {
    piece_index: u32,
    data: Vec<u8>,
    received: usize,
}

impl PieceBuffer {
    pub fn new(piece_index: u32, size: u32) -> Self {
        Self {
            piece_index,
            data: vec![0u8; size as usize],
            received: 0,
        }
    }

    /// Copy a block into the buffer at `begin`
    pub fn write_block(&mut self, begin: u32, block: &[u8]) -> Result<()> {
        let start = begin as usize;
        let end = start
            .checked_add(block.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                BittorrentError::OutOfRange(format!(
                    "block at {} of {} bytes exceeds piece {} size {}",
                    begin,
                    block.len(),
                    self.piece_index,
                    self.data.len()
                ))
            })?;

        self.data[start..end].copy_from_slice(block);
        self.received += block.len();

        debug!(
            "Added block to piece {} at offset {} ({} bytes, {}/{})",
            self.piece_index,
            begin,
            block.len(),
            self.received,
            self.data.len()
        );

        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.received >= self.data.len()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

/// Check a downloaded piece against the hash recorded in the torrent
pub fn verify_piece(meta: &Metainfo, piece_index: u32, data: &[u8]) -> Result<()> {
    let expected = meta
        .info
        .pieces
        .get(piece_index as usize)
        .ok_or_else(|| BittorrentError::OutOfRange(format!("piece index {}", piece_index)))?;

    if raw_hash(data) != *expected.as_bytes() {
        warn!("Piece {} failed verification", piece_index);
        return Err(BittorrentError::PieceHashMismatch(format!(
            "piece {} does not match {}",
            piece_index,
            expected.to_hex()
        )));
    }

    Ok(())
}
