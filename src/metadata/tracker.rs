use core::fmt;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::result::Result;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::metadata::bencode::{BencodeError, BencodeValue, Dictionary};
use crate::metadata::file::{extract_string, extract_uint, TorrentFile, TorrentFileError};
use crate::peer::{Peer, PeerAddress, PeerId};

/// A tracker that answered an announce, with the re-announce interval it asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracker {
    pub url: String,
    pub interval: u64,
}

#[derive(Debug, Clone)]
pub struct TrackerResponse {
    pub interval: u64,
    pub peers: Vec<PeerAddress>,
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("announce url '{0}' is invalid")]
    InvalidAnnounceUrl(String),
    #[error("announce url '{0}' does not use http(s)")]
    UnsupportedTransport(String),
    #[error("unable to build http client: {0}")]
    ClientSetup(reqwest::Error),
    #[error("no response received from tracker: {0}")]
    Unreachable(reqwest::Error),
    #[error("tracker response contains no body: {0}")]
    NoTrackerResponseBody(reqwest::Error),
    #[error("tracker response exceeds {MAX_RESPONSE_LENGTH} bytes")]
    ResponseTooLarge,
    #[error("tracker response is invalid bencode data: {0}")]
    NonBencodedTrackerResponse(BencodeError),
    #[error("tracker rejected the announce: {0}")]
    Rejected(String),
    #[error("tracker response is not a bencoded dictionary")]
    TrackerResponseNotADictionary,
    #[error("tracker response missing interval key")]
    MissingInterval,
    #[error("tracker response interval malformed: {0}")]
    MalformedInterval(TorrentFileError),
    #[error("tracker response missing peers key")]
    MissingPeers,
    #[error("tracker response peers entry is neither a list nor a byte string")]
    MalformedPeersList,
    #[error("compact peers byte length ({0}) is not a multiple of 6")]
    IllegalPeersLength(usize),
    #[error("tracker response contains a malformed peer: {0}")]
    MalformedPeer(TorrentFileError),
    #[error("tracker response contains an out of range port {0}")]
    IllegalPort(u64),
}

/// Largest tracker response body that will be read.
pub const MAX_RESPONSE_LENGTH: usize = 1 << 20;

const FAILURE_REASON: &[u8] = b"failure reason";
const INTERVAL: &[u8] = b"interval";
const PEERS: &[u8] = b"peers";
const IP: &[u8] = b"ip";
const PORT: &[u8] = b"port";

fn extract_compact_peers(bytes: &[u8]) -> Result<Vec<PeerAddress>, TrackerError> {
    if bytes.len() % 6 != 0 {
        return Err(TrackerError::IllegalPeersLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            PeerAddress::new(ip.to_string(), port)
        })
        .collect())
}

/// `peer id` is ignored here; a peer's identity is only trusted once it
/// has been learned from the handshake.
fn extract_peer(items: &Dictionary) -> Result<PeerAddress, TrackerError> {
    let host = extract_string(items.get(IP), "ip", true)
        .map_err(TrackerError::MalformedPeer)?
        .unwrap_or_default();
    let port = extract_uint(items.get(PORT), "port", true)
        .map_err(TrackerError::MalformedPeer)?
        .unwrap_or_default();
    let port = u16::try_from(port).map_err(|_| TrackerError::IllegalPort(port))?;
    Ok(PeerAddress::new(host, port))
}

fn extract_peers(value: Option<&BencodeValue>) -> Result<Vec<PeerAddress>, TrackerError> {
    match value {
        Some(BencodeValue::ByteString(bytes)) => extract_compact_peers(bytes),
        Some(BencodeValue::List(elements)) => elements
            .iter()
            .map(|element| match element {
                BencodeValue::Dictionary(items) => extract_peer(items),
                _ => Err(TrackerError::MalformedPeersList),
            })
            .collect(),
        Some(_) => Err(TrackerError::MalformedPeersList),
        None => Err(TrackerError::MissingPeers),
    }
}

impl TryFrom<&BencodeValue> for TrackerResponse {
    type Error = TrackerError;

    fn try_from(value: &BencodeValue) -> Result<Self, TrackerError> {
        let items = value.as_dictionary().ok_or(TrackerError::TrackerResponseNotADictionary)?;
        if let Some(reason) = items.get(FAILURE_REASON) {
            let reason = match reason {
                BencodeValue::ByteString(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                other => other.to_string(),
            };
            return Err(TrackerError::Rejected(reason));
        }
        let interval: u64 = extract_uint(items.get(INTERVAL), "interval", true)
            .map_err(|e| {
                match e {
                    TorrentFileError::MissingRequiredKey(_) => TrackerError::MissingInterval,
                    _ => TrackerError::MalformedInterval(e),
                }
            })?
            .unwrap_or_default();
        let peers = extract_peers(items.get(PEERS))?;
        Ok(TrackerResponse { interval, peers })
    }
}

impl fmt::Display for TrackerResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Interval (s): {}", self.interval)?;
        for (i, peer) in self.peers.iter().enumerate() {
            writeln!(f, "{i:03}: {peer}")?;
        }
        Ok(())
    }
}

/// Builds the announce request for `announce`. Raw-byte parameters are
/// percent-encoded by hand since `Url` would re-encode them as UTF-8.
pub fn announce_url(announce: &str, file: &TorrentFile, peer_id: &PeerId, port: u16) -> Result<Url, TrackerError> {
    let mut url = Url::parse(announce)
        .map_err(|_| TrackerError::InvalidAnnounceUrl(announce.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(TrackerError::UnsupportedTransport(announce.to_string()));
    }

    url.query_pairs_mut()
        .append_pair("port", &port.to_string())
        .append_pair("uploaded", "0")
        .append_pair("downloaded", "0")
        .append_pair("left", &file.total_length().to_string());
    url.set_fragment(None);

    let new_url_str = format!("{}&info_hash={}&peer_id={}", url, file.hash.url_encoded(), peer_id.url_encoded());
    Url::parse(&new_url_str).map_err(|_| TrackerError::InvalidAnnounceUrl(new_url_str))
}

pub async fn retrieve_peers(url: Url, timeout: Duration) -> Result<TrackerResponse, TrackerError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(TrackerError::ClientSetup)?;
    let response = client.get(url).send().await.map_err(TrackerError::Unreachable)?;
    let response_bytes = read_body(response).await?;

    let bencoded_response = BencodeValue::try_from(response_bytes.as_slice())
        .map_err(TrackerError::NonBencodedTrackerResponse)?;

    TrackerResponse::try_from(&bencoded_response)
}

async fn read_body(mut response: reqwest::Response) -> Result<Vec<u8>, TrackerError> {
    if response.content_length().is_some_and(|len| len > MAX_RESPONSE_LENGTH as u64) {
        return Err(TrackerError::ResponseTooLarge);
    }
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(TrackerError::NoTrackerResponseBody)? {
        if body.len() + chunk.len() > MAX_RESPONSE_LENGTH {
            return Err(TrackerError::ResponseTooLarge);
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Everything learned from announcing, merged across trackers.
#[derive(Debug, Default)]
pub(crate) struct Discovery {
    seen: HashSet<PeerAddress>,
    pub peers: Vec<Peer>,
    pub trackers: Vec<Tracker>,
}

impl Discovery {
    /// Records `tracker` and appends every peer not already known, returning
    /// how many were new.
    fn merge(&mut self, tracker: Tracker, peers: Vec<PeerAddress>) -> usize {
        self.trackers.push(tracker);
        let before = self.peers.len();
        for address in peers {
            if self.seen.insert(address.clone()) {
                self.peers.push(Peer::new(address));
            }
        }
        self.peers.len() - before
    }
}

/// Announces to every url of `file` concurrently. Failing trackers are
/// logged and skipped; the result holds whatever the others returned.
pub(crate) async fn announce_all(file: &TorrentFile, peer_id: &PeerId, config: &ClientConfig) -> Discovery {
    let state = Arc::new(Mutex::new(Discovery::default()));
    let urls = file.announce_urls();
    let mut tasks = Vec::with_capacity(urls.len());

    for announce in urls {
        let request = announce_url(&announce, file, peer_id, config.listen_port);
        let state_clone = state.clone();
        let timeout = config.announce_timeout;
        let tracker_url = announce.clone();

        tasks.push((announce, tokio::spawn(async move {
            let response = retrieve_peers(request?, timeout).await?;
            let tracker = Tracker { url: tracker_url, interval: response.interval };
            let mut guard = state_clone.lock().await;
            Ok::<usize, TrackerError>(guard.merge(tracker, response.peers))
        })));
    }

    for (announce, task) in tasks {
        match task.await {
            Ok(Ok(added)) => info!(tracker = %announce, added, "announce succeeded"),
            Ok(Err(e)) => warn!(tracker = %announce, "announce failed: {e}"),
            Err(e) => warn!(tracker = %announce, "announce task did not complete: {e}"),
        }
    }

    let mut guard = state.lock().await;
    std::mem::take(&mut *guard)
}
