mod connection;
mod message;
mod protocol;

pub use connection::PeerConnection;
pub use message::{read_message, BlockInfo, MessageId, PeerMessage, PieceBlock};
pub use protocol::{Handshake, HANDSHAKE_LEN, PROTOCOL_STRING};

use std::time::Duration;

/// Bound on every connect, read and write against a peer
pub const IO_TIMEOUT: Duration = Duration::from_secs(5);
