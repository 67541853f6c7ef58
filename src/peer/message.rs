use crate::error::{BittorrentError, Result};
use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest frame accepted from a peer. A 16 KiB block plus headers, or a
/// bitfield for a very large torrent, fits comfortably.
pub const MAX_MESSAGE_LENGTH: u32 = 2 * 1024 * 1024;

/// Message kinds of the peer wire protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
    Port = 9,
}

impl TryFrom<u8> for MessageId {
    type Error = BittorrentError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => MessageId::Choke,
            1 => MessageId::Unchoke,
            2 => MessageId::Interested,
            3 => MessageId::NotInterested,
            4 => MessageId::Have,
            5 => MessageId::Bitfield,
            6 => MessageId::Request,
            7 => MessageId::Piece,
            8 => MessageId::Cancel,
            9 => MessageId::Port,
            other => {
                return Err(BittorrentError::ProtocolError(format!(
                    "Unknown message ID: {}",
                    other
                )))
            }
        })
    }
}

/// Information about a block within a piece
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Piece index
    pub piece_index: u32,
    /// Byte offset within the piece
    pub offset: u32,
    /// Length of the block
    pub length: u32,
}

impl BlockInfo {
    pub fn new(piece_index: u32, offset: u32, length: u32) -> Self {
        Self {
            piece_index,
            offset,
            length,
        }
    }
}

/// A received frame: its kind (`None` for keep-alive) and the raw payload
/// that follows the kind byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerMessage {
    pub id: Option<MessageId>,
    pub payload: Vec<u8>,
}

impl PeerMessage {
    pub fn keep_alive() -> Self {
        Self {
            id: None,
            payload: Vec::new(),
        }
    }

    pub fn is_keep_alive(&self) -> bool {
        self.id.is_none()
    }

    /// `<len=1><id=2>`
    pub fn interested() -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(5);
        buf.put_u32(1);
        buf.put_u8(MessageId::Interested as u8);
        buf.to_vec()
    }

    /// `<len=13><id=6><index><begin><length>`
    pub fn request(block: &BlockInfo) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(17);
        buf.put_u32(13); // length = 1 + 4 + 4 + 4
        buf.put_u8(MessageId::Request as u8);
        buf.put_u32(block.piece_index);
        buf.put_u32(block.offset);
        buf.put_u32(block.length);
        buf.to_vec()
    }
}

/// Payload of a `piece` message: `<index><begin><block...>`
#[derive(Debug, PartialEq, Eq)]
pub struct PieceBlock<'a> {
    pub piece_index: u32,
    pub begin: u32,
    pub data: &'a [u8],
}

impl<'a> PieceBlock<'a> {
    pub fn parse(mut payload: &'a [u8]) -> Result<Self> {
        if payload.len() < 8 {
            return Err(BittorrentError::ProtocolError(
                "short piece payload".to_string(),
            ));
        }
        let piece_index = payload.get_u32();
        let begin = payload.get_u32();
        Ok(Self {
            piece_index,
            begin,
            data: payload,
        })
    }
}

/// Read one length-prefixed frame.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<PeerMessage> {
    let length = reader.read_u32().await?;

    if length == 0 {
        return Ok(PeerMessage::keep_alive());
    }
    if length > MAX_MESSAGE_LENGTH {
        return Err(BittorrentError::ProtocolError(format!(
            "message too large: {} bytes",
            length
        )));
    }

    let mut frame = vec![0u8; length as usize];
    reader.read_exact(&mut frame).await?;

    let id = MessageId::try_from(frame[0])?;
    frame.remove(0);

    Ok(PeerMessage {
        id: Some(id),
        payload: frame,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_interested_layout() {
        assert_eq!(PeerMessage::interested(), vec![0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_request_layout() {
        let bytes = PeerMessage::request(&BlockInfo::new(1, 0x4000, 0x1388));
        assert_eq!(
            bytes,
            vec![0, 0, 0, 13, 6, 0, 0, 0, 1, 0, 0, 0x40, 0, 0, 0, 0x13, 0x88]
        );
    }

    #[test]
    fn test_message_id_range() {
        assert_eq!(MessageId::try_from(9).unwrap(), MessageId::Port);
        assert!(matches!(
            MessageId::try_from(10),
            Err(BittorrentError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_piece_block_parse() {
        let payload = [0, 0, 0, 3, 0, 0, 0x40, 0, 9, 8, 7];
        let block = PieceBlock::parse(&payload).unwrap();
        assert_eq!(block.piece_index, 3);
        assert_eq!(block.begin, 0x4000);
        assert_eq!(block.data, &[9, 8, 7]);

        assert!(matches!(
            PieceBlock::parse(&payload[..7]),
            Err(BittorrentError::ProtocolError(_))
        ));
    }

    #[tokio::test]
    async fn test_read_keep_alive_then_unchoke() {
        let mut stream = Builder::new()
            .read(&[0, 0, 0, 0])
            .read(&[0, 0, 0, 1, 1])
            .build();

        let first = read_message(&mut stream).await.unwrap();
        assert!(first.is_keep_alive());
        assert!(first.payload.is_empty());

        let second = read_message(&mut stream).await.unwrap();
        assert_eq!(second.id, Some(MessageId::Unchoke));
        assert!(second.payload.is_empty());
    }

    #[tokio::test]
    async fn test_read_payload_across_chunks() {
        let mut stream = Builder::new()
            .read(&[0, 0])
            .read(&[0, 5, 4])
            .read(&[0, 0])
            .read(&[0, 7])
            .build();

        let msg = read_message(&mut stream).await.unwrap();
        assert_eq!(msg.id, Some(MessageId::Have));
        assert_eq!(msg.payload, vec![0, 0, 0, 7]);
    }

    #[tokio::test]
    async fn test_read_short_frame_is_io_error() {
        let mut stream = Builder::new().read(&[0, 0, 0, 9, 7, 1, 2]).build();
        assert!(matches!(
            read_message(&mut stream).await,
            Err(BittorrentError::IoError(_))
        ));

        let mut stream = Builder::new().read(&[0, 0]).build();
        assert!(matches!(
            read_message(&mut stream).await,
            Err(BittorrentError::IoError(_))
        ));
    }

    #[tokio::test]
    async fn test_read_unknown_kind() {
        let mut stream = Builder::new().read(&[0, 0, 0, 1, 20]).build();
        assert!(matches!(
            read_message(&mut stream).await,
            Err(BittorrentError::ProtocolError(_))
        ));
    }

    #[tokio::test]
    async fn test_read_oversized_frame() {
        let mut stream = Builder::new().read(&[0xff, 0xff, 0xff, 0xff]).build();
        assert!(matches!(
            read_message(&mut stream).await,
            Err(BittorrentError::ProtocolError(_))
        ));
    }
}
