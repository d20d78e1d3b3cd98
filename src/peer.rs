pub(crate) mod handshake;

use std::fmt;

use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use rand::{CryptoRng, RngCore};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::metadata::file::InfoHash;
use crate::peer::handshake::exchange;
use crate::util::to_hex;

/// Azureus-style client tag placed in front of the random part of our peer id.
pub const CLIENT_PREFIX: &[u8; 8] = b"-TM0010-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub [u8; 20]);

impl PeerId {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut id = [0u8; 20];
        id[..CLIENT_PREFIX.len()].copy_from_slice(CLIENT_PREFIX);
        rng.fill_bytes(&mut id[CLIENT_PREFIX.len()..]);
        PeerId(id)
    }

    pub fn url_encoded(&self) -> String {
        percent_encode(&self.0, NON_ALPHANUMERIC).to_string()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", to_hex(&self.0))
    }
}

/// Where a peer can be reached. Two peers are the same peer exactly when
/// their addresses are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        PeerAddress { host: host.into(), port }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    address: PeerAddress,
    peer_id: Option<PeerId>,
    choked: bool,
    interested: bool,
    available: bool,
}

impl Peer {
    /// A freshly discovered peer: choked, uninterested and not yet handshaken.
    pub fn new(address: PeerAddress) -> Self {
        Peer {
            address,
            peer_id: None,
            choked: true,
            interested: false,
            available: false,
        }
    }

    pub fn address(&self) -> &PeerAddress {
        &self.address
    }

    pub fn peer_id(&self) -> Option<&PeerId> {
        self.peer_id.as_ref()
    }

    pub fn is_choked(&self) -> bool {
        self.choked
    }

    pub fn is_interested(&self) -> bool {
        self.interested
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    fn mark_available(&mut self, peer_id: PeerId) {
        self.peer_id = Some(peer_id);
        self.available = true;
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.address)?;
        match &self.peer_id {
            Some(id) if self.available => write!(f, " (available, id {})", id),
            _ => write!(f, " (unavailable)"),
        }
    }
}

/// Handshakes with every peer concurrently and marks the ones that answer
/// with `info_hash`. Task `i` only ever reports back into `peers[i]`; the
/// slice cannot change length while the tasks run.
pub(crate) async fn handshake_all(peers: &mut [Peer], info_hash: InfoHash, client_id: PeerId, config: &ClientConfig) {
    let mut tasks = Vec::with_capacity(peers.len());
    for peer in peers.iter() {
        let address = peer.address.clone();
        let config = *config;
        tasks.push(tokio::spawn(async move {
            exchange(&address, &info_hash, &client_id, &config).await
        }));
    }

    for (peer, task) in peers.iter_mut().zip(tasks) {
        match task.await {
            Ok(Ok(remote_id)) => {
                debug!(peer = %peer.address, id = %remote_id, "handshake completed");
                peer.mark_available(remote_id);
            },
            Ok(Err(e)) => debug!(peer = %peer.address, protocol_mismatch = e.is_protocol_mismatch(), "handshake abandoned: {e}"),
            Err(e) => debug!(peer = %peer.address, "handshake task did not complete: {e}"),
        }
    }

    let available = peers.iter().filter(|p| p.available).count();
    info!(available, total = peers.len(), "handshake stage finished");
}
