mod bencode;
mod cli;
mod client;
mod error;
mod identity;
mod peer;
mod piece;
mod storage;
mod torrent;
mod tracker;

use anyhow::Result;
use cli::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    cli.run().await?;

    Ok(())
}
