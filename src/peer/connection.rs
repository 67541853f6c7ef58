use super::{read_message, Handshake, PeerMessage, HANDSHAKE_LEN, IO_TIMEOUT};
use crate::error::{BittorrentError, Result};
use crate::torrent::Metainfo;
use crate::tracker::Peer;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// An established, handshaken connection to a single peer.
///
/// The connection owns its stream; dropping it closes the socket, which is
/// what happens on every error path out of the handshake and piece download.
pub struct PeerConnection<S = TcpStream> {
    peer: Peer,
    stream: S,
    remote_peer_id: [u8; 20],
}

impl PeerConnection<TcpStream> {
    /// Connect to a peer and perform handshake
    pub async fn connect_and_handshake(
        meta: &Metainfo,
        peer: &Peer,
        local_id: &[u8],
    ) -> Result<Self> {
        let local_id: [u8; 20] = local_id.try_into().map_err(|_| {
            BittorrentError::InvalidArgument(format!(
                "peer id must be exactly 20 bytes, got {}",
                local_id.len()
            ))
        })?;

        let stream = open_stream(peer).await?;
        Self::handshake(stream, peer.clone(), meta.info_hash, local_id).await
    }
}

/// Try each resolved address in order until one accepts.
async fn open_stream(peer: &Peer) -> Result<TcpStream> {
    info!("Connecting to peer: {}", peer);

    let addrs = lookup_host((peer.host.as_str(), peer.port))
        .await
        .map_err(|e| BittorrentError::ConnectError(format!("Failed to resolve {}: {}", peer, e)))?;

    for addr in addrs {
        match timeout(IO_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                debug!("Connected to {}", addr);
                return Ok(stream);
            }
            Ok(Err(e)) => warn!("Failed to connect to {}: {}", addr, e),
            Err(_) => warn!("Timed out connecting to {}", addr),
        }
    }

    Err(BittorrentError::ConnectError(format!(
        "no address of {} accepted a connection",
        peer
    )))
}

impl<S: AsyncRead + AsyncWrite + Unpin> PeerConnection<S> {
    /// Exchange greetings over an open stream and check the peer serves the
    /// same torrent. The stream is dropped (closed) if this fails.
    pub async fn handshake(
        mut stream: S,
        peer: Peer,
        info_hash: [u8; 20],
        local_id: [u8; 20],
    ) -> Result<Self> {
        let handshake = Handshake::new(info_hash, local_id);
        timeout(IO_TIMEOUT, stream.write_all(&handshake.to_bytes())).await??;

        debug!("Sent handshake to {}", peer);

        let mut reply = [0u8; HANDSHAKE_LEN];
        timeout(IO_TIMEOUT, stream.read_exact(&mut reply)).await??;

        let remote = Handshake::from_bytes(&reply)?;
        if remote.info_hash != info_hash {
            return Err(BittorrentError::ProtocolError(
                "info hash mismatch".to_string(),
            ));
        }

        info!(
            "Handshake OK with {} (peer id {})",
            peer,
            hex::encode(remote.peer_id)
        );

        Ok(Self {
            peer,
            stream,
            remote_peer_id: remote.peer_id,
        })
    }

    /// Write a fully framed message
    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        timeout(IO_TIMEOUT, self.stream.write_all(bytes)).await??;
        debug!("Sent {} bytes to {}", bytes.len(), self.peer);
        Ok(())
    }

    /// Receive a message from the peer
    pub async fn receive_message(&mut self) -> Result<PeerMessage> {
        let message = timeout(IO_TIMEOUT, read_message(&mut self.stream)).await??;
        if message.is_keep_alive() {
            debug!("Keep-alive from {}", self.peer);
            return Ok(message);
        }
        debug!(
            "Received from {}: {:?} ({} bytes)",
            self.peer,
            message.id,
            message.payload.len()
        );
        Ok(message)
    }

    /// Shut down the write side and release the stream.
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        debug!("Closed connection to {}", self.peer);
        Ok(())
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// The 20-byte id the remote side announced in its greeting
    pub fn remote_peer_id(&self) -> &[u8; 20] {
        &self.remote_peer_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PROTOCOL_STRING;
    use crate::torrent::fixtures;
    use tokio::net::TcpListener;

    const LOCAL_ID: [u8; 20] = *b"-RS0001-abcdefghijkl";
    const REMOTE_ID: [u8; 20] = *b"-XX0001-remotepeer01";

    async fn listener() -> (TcpListener, Peer) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, Peer::new("127.0.0.1", port))
    }

    #[tokio::test]
    async fn test_connect_and_handshake() {
        let meta = fixtures::metainfo(16, &fixtures::content(32));
        let info_hash = meta.info_hash;
        let (listener, peer) = listener().await;

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; HANDSHAKE_LEN];
            socket.read_exact(&mut greeting).await.unwrap();
            socket
                .write_all(&Handshake::new(info_hash, REMOTE_ID).to_bytes())
                .await
                .unwrap();
            greeting
        });

        let conn = PeerConnection::connect_and_handshake(&meta, &peer, &LOCAL_ID)
            .await
            .unwrap();
        assert_eq!(conn.remote_peer_id(), &REMOTE_ID);
        assert_eq!(conn.peer(), &peer);

        let greeting = server.await.unwrap();
        assert_eq!(greeting[0], 19);
        assert_eq!(&greeting[1..20], PROTOCOL_STRING);
        assert_eq!(&greeting[20..28], &[0u8; 8]);
        assert_eq!(&greeting[28..48], &info_hash);
        assert_eq!(&greeting[48..68], &LOCAL_ID);
    }

    #[tokio::test]
    async fn test_info_hash_mismatch_closes_socket() {
        let meta = fixtures::metainfo(16, &fixtures::content(32));
        let (listener, peer) = listener().await;

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; HANDSHAKE_LEN];
            socket.read_exact(&mut greeting).await.unwrap();
            socket
                .write_all(&Handshake::new([0xee; 20], REMOTE_ID).to_bytes())
                .await
                .unwrap();

            // The client must have closed its end: the next read is EOF.
            let mut rest = [0u8; 1];
            socket.read(&mut rest).await.unwrap()
        });

        let result = PeerConnection::connect_and_handshake(&meta, &peer, &LOCAL_ID).await;
        assert!(matches!(
            result,
            Err(BittorrentError::ProtocolError(ref msg)) if msg == "info hash mismatch"
        ));

        assert_eq!(server.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bad_protocol_string_from_peer() {
        let mut reply = Handshake::new([7u8; 20], REMOTE_ID).to_bytes();
        reply[1] = b'b';

        let stream = tokio_test::io::Builder::new()
            .write(&Handshake::new([7u8; 20], LOCAL_ID).to_bytes())
            .read(&reply)
            .build();

        let result =
            PeerConnection::handshake(stream, Peer::new("mock", 1), [7u8; 20], LOCAL_ID).await;
        assert!(matches!(
            result,
            Err(BittorrentError::ProtocolError(ref msg)) if msg == "bad protocol string"
        ));
    }

    #[tokio::test]
    async fn test_short_greeting_is_io_error() {
        let stream = tokio_test::io::Builder::new()
            .write(&Handshake::new([7u8; 20], LOCAL_ID).to_bytes())
            .read(&[19, b'B', b'i'])
            .build();

        let result =
            PeerConnection::handshake(stream, Peer::new("mock", 1), [7u8; 20], LOCAL_ID).await;
        assert!(matches!(result, Err(BittorrentError::IoError(_))));
    }

    #[tokio::test]
    async fn test_local_id_must_be_20_bytes() {
        let meta = fixtures::metainfo(16, &fixtures::content(32));
        let result =
            PeerConnection::connect_and_handshake(&meta, &Peer::new("127.0.0.1", 1), b"short")
                .await;
        assert!(matches!(result, Err(BittorrentError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let meta = fixtures::metainfo(16, &fixtures::content(32));
        let (listener, peer) = listener().await;
        drop(listener);

        let result = PeerConnection::connect_and_handshake(&meta, &peer, &LOCAL_ID).await;
        assert!(matches!(result, Err(BittorrentError::ConnectError(_))));
    }
}
