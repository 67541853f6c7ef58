use crate::error::{BittorrentError, Result};
use crate::peer::PeerConnection;
use crate::piece::{download_piece, verify_piece};
use crate::storage::OutputFile;
use crate::torrent::Metainfo;
use crate::tracker::{generate_peer_id, Peer, TrackerClient, TrackerRequest};
use std::path::Path;
use tracing::info;

/// Configuration for the BitTorrent client
pub struct ClientConfig {
    /// Our 20-byte id, sent to the tracker and in every handshake
    pub peer_id: [u8; 20],
    /// Port reported to the tracker
    pub listen_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            peer_id: generate_peer_id(),
            listen_port: 6881,
        }
    }
}

/// Sequential single-peer downloader
pub struct TorrentClient {
    config: ClientConfig,
    tracker: TrackerClient,
}

impl TorrentClient {
    pub fn new(config: ClientConfig) -> Self {
        info!(
            "Client initialized with peer_id: {}",
            hex::encode(config.peer_id)
        );

        Self {
            config,
            tracker: TrackerClient::new(),
        }
    }

    /// Ask the tracker for peers serving this torrent
    pub async fn peers(&self, meta: &Metainfo) -> Result<Vec<Peer>> {
        let request = TrackerRequest::new(
            meta.info_hash,
            self.config.peer_id,
            self.config.listen_port,
            meta.info.length,
        );
        let response = self.tracker.announce(&meta.announce, &request).await?;
        Ok(response.peers)
    }

    /// Handshake with a peer and return the id it announced
    pub async fn handshake(&self, meta: &Metainfo, peer: &Peer) -> Result<[u8; 20]> {
        let conn =
            PeerConnection::connect_and_handshake(meta, peer, &self.config.peer_id).await?;
        let remote_id = *conn.remote_peer_id();
        conn.close().await?;
        Ok(remote_id)
    }

    /// Fetch and verify a single piece over a fresh connection
    pub async fn download_piece(
        &self,
        meta: &Metainfo,
        peer: &Peer,
        piece_index: u32,
    ) -> Result<Vec<u8>> {
        let mut conn =
            PeerConnection::connect_and_handshake(meta, peer, &self.config.peer_id).await?;
        let data = download_piece(&mut conn, meta, piece_index).await?;
        conn.close().await?;

        verify_piece(meta, piece_index, &data)?;
        Ok(data)
    }

    /// Download the whole file from the first peer the tracker returns
    pub async fn download(&self, meta: &Metainfo, output: &Path) -> Result<()> {
        let peers = self.peers(meta).await?;
        let peer = peers.first().ok_or_else(|| {
            BittorrentError::TrackerFailure("tracker returned no peers".to_string())
        })?;

        self.download_from_peer(meta, peer, output).await
    }

    /// Download every piece in ascending order, reconnecting for each one,
    /// and write it at its offset in `output`.
    pub async fn download_from_peer(
        &self,
        meta: &Metainfo,
        peer: &Peer,
        output: &Path,
    ) -> Result<()> {
        info!("Starting download of {} from {}", meta.info.name, peer);
        info!("Total size: {} bytes", meta.info.length);
        info!("Pieces: {}", meta.num_pieces());
        info!("Info hash: {}", meta.info_hash_hex());

        let mut out = OutputFile::create(output, meta.info.length).await?;

        let num_pieces = meta.num_pieces();
        for piece_index in 0..num_pieces {
            info!("Downloading piece {} / {}", piece_index + 1, num_pieces);
            let data = self.download_piece(meta, peer, piece_index).await?;
            out.write_at(meta.piece_offset(piece_index), &data).await?;
        }

        out.finish().await?;
        info!("Download complete, saved to {}", output.display());
        Ok(())
    }
}

impl Default for TorrentClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}
