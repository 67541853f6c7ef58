use super::{blocks, PieceBuffer};
use crate::error::{BittorrentError, Result};
use crate::peer::{MessageId, PeerConnection, PeerMessage, PieceBlock};
use crate::torrent::Metainfo;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

enum State {
    Start,
    AwaitUnchoke,
    Requesting,
    Collecting(PieceBuffer),
}

/// Retrieve one piece over an established connection.
///
/// Sends `interested`, waits for `unchoke`, pipelines one request per block
/// and collects `piece` messages until the buffer is full. The result is not
/// hash-checked here; see [`super::verify_piece`].
///
/// `piece_index` is checked against the torrent's geometry before `interested`
/// is sent, so an out-of-range index fails with no bytes on the wire.
pub async fn download_piece<S>(
    conn: &mut PeerConnection<S>,
    meta: &Metainfo,
    piece_index: u32,
) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let piece_size = meta.piece_size(piece_index)?;
    info!(
        "Downloading piece {} ({} bytes) from {}",
        piece_index,
        piece_size,
        conn.peer()
    );

    let mut state = State::Start;
    loop {
        state = match state {
            State::Start => {
                conn.send(&PeerMessage::interested()).await?;
                State::AwaitUnchoke
            }

            State::AwaitUnchoke => {
                let message = conn.receive_message().await?;
                match message.id {
                    Some(MessageId::Unchoke) => State::Requesting,
                    Some(MessageId::Choke) => {
                        return Err(BittorrentError::ProtocolError(
                            "choked before unchoke".to_string(),
                        ))
                    }
                    // keep-alive, bitfield, have, ...
                    _ => State::AwaitUnchoke,
                }
            }

            State::Requesting => {
                for block in blocks(piece_index, piece_size) {
                    conn.send(&PeerMessage::request(&block)).await?;
                }
                State::Collecting(PieceBuffer::new(piece_index, piece_size))
            }

            State::Collecting(buffer) if buffer.is_complete() => {
                info!("Piece {} complete", piece_index);
                return Ok(buffer.into_inner());
            }

            State::Collecting(mut buffer) => {
                let message = conn.receive_message().await?;
                match message.id {
                    Some(MessageId::Piece) => {
                        let block = PieceBlock::parse(&message.payload)?;
                        if block.piece_index == piece_index {
                            buffer.write_block(block.begin, block.data)?;
                        } else {
                            debug!(
                                "Discarding block for piece {} while collecting {}",
                                block.piece_index, piece_index
                            );
                        }
                    }
                    Some(MessageId::Choke) => {
                        return Err(BittorrentError::ProtocolError(
                            "choked mid-piece".to_string(),
                        ))
                    }
                    _ => {}
                }
                State::Collecting(buffer)
            }
        };
    }
}
