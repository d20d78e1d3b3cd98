use std::fmt;
use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::config::ClientConfig;
use crate::metadata::bencode::{BencodeError, BencodeValue};
use crate::metadata::file::{InfoHash, TorrentFile, TorrentFileError};
use crate::metadata::tracker::{announce_all, Tracker};
use crate::peer::{handshake_all, Peer, PeerId};

#[derive(Debug, Error)]
pub enum TorrentError {
    #[error("torrent file is not valid bencode: {0}")]
    MalformedEncoding(#[from] BencodeError),
    #[error("torrent file is missing required information: {0}")]
    SchemaViolation(#[from] TorrentFileError),
    #[error("no peers found after announcing to every tracker")]
    NoPeersDiscovered,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

type Result<T> = std::result::Result<T, TorrentError>;

/// Decodes and validates the contents of a torrent file.
pub fn decode_torrent_file(bytes: &[u8]) -> Result<TorrentFile> {
    let value = BencodeValue::try_from(bytes)?;
    Ok(TorrentFile::try_from(&value)?)
}

/// A torrent together with the trackers and peers discovered for it.
#[derive(Debug)]
pub struct Torrent {
    file: TorrentFile,
    client_id: PeerId,
    trackers: Vec<Tracker>,
    peers: Vec<Peer>,
}

impl Torrent {
    /// Reads the torrent file at `path`, announces to all of its trackers and
    /// handshakes with every peer they return, under a freshly generated
    /// client id.
    pub async fn new<P: AsRef<Path>>(path: P, config: &ClientConfig) -> Result<Self> {
        let client_id = PeerId::generate(&mut rand::thread_rng());
        Self::with_client_id(path, config, client_id).await
    }

    /// Same as [`Torrent::new`] but identifies to trackers and peers as `client_id`.
    pub async fn with_client_id<P: AsRef<Path>>(path: P, config: &ClientConfig, client_id: PeerId) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let file = decode_torrent_file(&bytes)?;
        info!(name = file.name(), info_hash = %file.hash, "decoded torrent file");

        let mut torrent = Torrent {
            file,
            client_id,
            trackers: Vec::new(),
            peers: Vec::new(),
        };
        torrent.request_peers(config).await?;
        torrent.handshake(config).await;
        Ok(torrent)
    }

    async fn request_peers(&mut self, config: &ClientConfig) -> Result<()> {
        let discovery = announce_all(&self.file, &self.client_id, config).await;
        if discovery.peers.is_empty() {
            return Err(TorrentError::NoPeersDiscovered);
        }
        info!(peers = discovery.peers.len(), trackers = discovery.trackers.len(), "announce stage finished");
        self.trackers = discovery.trackers;
        self.peers = discovery.peers;
        Ok(())
    }

    async fn handshake(&mut self, config: &ClientConfig) {
        handshake_all(&mut self.peers, self.file.hash, self.client_id, config).await;
    }

    pub fn name(&self) -> &str {
        self.file.name()
    }

    pub fn file(&self) -> &TorrentFile {
        &self.file
    }

    pub fn info_hash(&self) -> &InfoHash {
        &self.file.hash
    }

    pub fn client_id(&self) -> &PeerId {
        &self.client_id
    }

    pub fn trackers(&self) -> &[Tracker] {
        &self.trackers
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn available_peers(&self) -> usize {
        self.peers.iter().filter(|p| p.is_available()).count()
    }
}

impl fmt::Display for Torrent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "name: {}", self.name())?;
        writeln!(f, "info hash: {}", self.info_hash())?;
        for tracker in &self.trackers {
            writeln!(f, "tracker: {} (every {} s)", tracker.url, tracker.interval)?;
        }
        writeln!(f, "peers: {} of {} available", self.available_peers(), self.peers.len())?;
        for peer in &self.peers {
            writeln!(f, "  {}", peer)?;
        }
        Ok(())
    }
}
