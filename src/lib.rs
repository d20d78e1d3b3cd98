use std::path::Path;

mod config;
mod metadata;
mod peer;
mod torrent;
mod util;

pub use config::{ClientConfig, DEFAULT_PORT, DEFAULT_TIMEOUT};
pub use metadata::bencode::{BencodeError, BencodeValue, Dictionary, MAX_DEPTH};
pub use metadata::file::{FileModeInfo, InfoHash, MultiFileInfo, TorrentFile, TorrentFileError};
pub use metadata::tracker::{
    announce_url, retrieve_peers, Tracker, TrackerError, TrackerResponse, MAX_RESPONSE_LENGTH,
};
pub use peer::handshake::{Handshake, HandshakeError, HANDSHAKE_LENGTH};
pub use peer::{Peer, PeerAddress, PeerId, CLIENT_PREFIX};
pub use torrent::{decode_torrent_file, Torrent, TorrentError};

pub fn parse_torrent<P: AsRef<Path>>(path: P) -> Result<TorrentFile, TorrentError> {
    let bytes = std::fs::read(path)?;
    decode_torrent_file(&bytes)
}

pub async fn add_torrent<P: AsRef<Path>>(path: P, config: &ClientConfig) -> Result<Torrent, TorrentError> {
    Torrent::new(path, config).await
}
