use crate::bencode;
use crate::client::{ClientConfig, TorrentClient};
use crate::torrent::{load_torrent_file, Metainfo};
use crate::tracker::Peer;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "torrent-fetch")]
#[command(about = "A minimal single-peer BitTorrent client", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a bencoded value and print it as JSON
    Decode {
        /// Bencoded input, e.g. "l5:helloi52ee"
        value: String,
    },

    /// Show information about a torrent file
    Info {
        /// Path to the .torrent file
        torrent: PathBuf,
    },

    /// List the peers the tracker returns for a torrent
    Peers {
        /// Path to the .torrent file
        torrent: PathBuf,
    },

    /// Handshake with a peer and print its peer id
    Handshake {
        /// Path to the .torrent file
        torrent: PathBuf,

        /// Peer address as host:port
        peer: String,
    },

    /// Download and verify a single piece from a peer
    #[command(name = "download_piece")]
    DownloadPiece {
        /// Write the piece to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Path to the .torrent file
        torrent: PathBuf,

        /// Zero-based piece index
        piece: u32,

        /// Peer address as host:port
        peer: String,
    },

    /// Download the whole file from the first peer the tracker returns
    Download {
        /// Destination file
        #[arg(short, long)]
        output: PathBuf,

        /// Path to the .torrent file
        torrent: PathBuf,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Decode { value } => {
                let decoded = bencode::decode(value.as_bytes())?;
                println!("{}", serde_json::to_string(&decoded)?);
            }

            Commands::Info { torrent } => {
                let meta = load(torrent).await?;
                show_torrent_info(&meta);
            }

            Commands::Peers { torrent } => {
                let meta = load(torrent).await?;
                let client = TorrentClient::new(ClientConfig::default());
                for peer in client.peers(&meta).await? {
                    println!("{}", peer);
                }
            }

            Commands::Handshake { torrent, peer } => {
                let peer: Peer = peer.parse()?;
                let meta = load(torrent).await?;
                let client = TorrentClient::new(ClientConfig::default());
                let remote_id = client.handshake(&meta, &peer).await?;
                println!("Peer ID: {}", hex::encode(remote_id));
            }

            Commands::DownloadPiece {
                output,
                torrent,
                piece,
                peer,
            } => {
                let peer: Peer = peer.parse()?;
                let meta = load(torrent).await?;
                let client = TorrentClient::new(ClientConfig::default());
                let data = client.download_piece(&meta, &peer, *piece).await?;

                if let Some(output) = output {
                    tokio::fs::write(output, &data)
                        .await
                        .with_context(|| format!("failed to write {}", output.display()))?;
                }
                println!("Piece {} downloaded ({} bytes)", piece, data.len());
            }

            Commands::Download { output, torrent } => {
                let meta = load(torrent).await?;
                let client = TorrentClient::new(ClientConfig::default());
                client.download(&meta, output).await?;
                println!("Downloaded {} to {}.", torrent.display(), output.display());
            }
        }

        Ok(())
    }
}

async fn load(path: &Path) -> Result<Metainfo> {
    load_torrent_file(path)
        .await
        .with_context(|| format!("failed to load {}", path.display()))
}

fn show_torrent_info(meta: &Metainfo) {
    println!("Tracker URL: {}", meta.announce);
    println!("Length: {}", meta.info.length);
    println!("Info Hash: {}", meta.info_hash_hex());
    println!("Piece Length: {}", meta.info.piece_length);
    println!("Piece Hashes:");
    for hash in meta.info.pieces.iter() {
        println!("{}", hash.to_hex());
    }
}
