use std::result::Result;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::ClientConfig;
use crate::metadata::file::InfoHash;
use crate::peer::{PeerAddress, PeerId};

const P_STR: &[u8] = b"BitTorrent protocol";
pub const HANDSHAKE_LENGTH: usize = 1 + 19 + 8 + 20 + 20;

/// Bytes following the protocol identifier: reserved flags, info hash and peer id.
const TRAILER_LENGTH: usize = 8 + 20 + 20;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("unable to connect to peer: {0}")]
    Unreachable(std::io::Error),
    #[error("peer did not complete the exchange within {0:?}")]
    TimedOut(Duration),
    #[error("unable to send handshake: {0}")]
    TransmissionError(std::io::Error),
    #[error("unable to receive handshake: {0}")]
    ReceiveError(std::io::Error),
    #[error("peer sent an empty protocol identifier")]
    EmptyProtocolId,
    #[error("peer serves info hash {received} instead of {expected}")]
    MismatchedHash { expected: InfoHash, received: InfoHash },
}

impl HandshakeError {
    /// True when the peer answered but does not speak our protocol or torrent.
    pub fn is_protocol_mismatch(&self) -> bool {
        matches!(self, HandshakeError::EmptyProtocolId | HandshakeError::MismatchedHash { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub flags: [u8; 8],
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
}

impl Handshake {
    pub fn new(info_hash: InfoHash, peer_id: PeerId) -> Self {
        Handshake {
            flags: [0; 8],
            info_hash,
            peer_id,
        }
    }

    /// Parses everything after the leading length byte. The protocol
    /// identifier is not checked; only the fixed-size trailer is interpreted.
    fn from_body(body: &[u8]) -> Option<Self> {
        let start = body.len().checked_sub(TRAILER_LENGTH)?;
        let trailer = &body[start..];
        let mut flags = [0u8; 8];
        let mut info_hash = [0u8; 20];
        let mut peer_id = [0u8; 20];
        flags.copy_from_slice(&trailer[0..8]);
        info_hash.copy_from_slice(&trailer[8..28]);
        peer_id.copy_from_slice(&trailer[28..48]);
        Some(Handshake { flags, info_hash: InfoHash(info_hash), peer_id: PeerId(peer_id) })
    }
}

impl From<&Handshake> for [u8; HANDSHAKE_LENGTH] {
    fn from(handshake: &Handshake) -> [u8; HANDSHAKE_LENGTH] {
        let mut bytes = [0u8; HANDSHAKE_LENGTH];
        bytes[0] = P_STR.len() as u8;
        bytes[1..20].copy_from_slice(P_STR);
        bytes[20..28].copy_from_slice(&handshake.flags);
        bytes[28..48].copy_from_slice(handshake.info_hash.as_bytes());
        bytes[48..68].copy_from_slice(&handshake.peer_id.0);
        bytes
    }
}

pub(crate) async fn read_handshake<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Handshake, HandshakeError> {
    let mut length: [u8; 1] = [0; 1];
    stream.read_exact(&mut length).await.map_err(HandshakeError::ReceiveError)?;
    if length[0] == 0 {
        return Err(HandshakeError::EmptyProtocolId);
    }
    let mut body = vec![0u8; length[0] as usize + TRAILER_LENGTH];
    stream.read_exact(&mut body).await.map_err(HandshakeError::ReceiveError)?;
    Handshake::from_body(&body).ok_or(HandshakeError::EmptyProtocolId)
}

/// Sends our handshake and validates the reply, returning the remote peer id.
pub(crate) async fn handshake<S>(stream: &mut S, info_hash: &InfoHash, client_id: &PeerId) -> Result<PeerId, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mine = Handshake::new(*info_hash, *client_id);
    let my_bytes = <[u8; HANDSHAKE_LENGTH]>::from(&mine);
    stream.write_all(&my_bytes).await.map_err(HandshakeError::TransmissionError)?;
    let theirs = read_handshake(stream).await?;
    if mine.info_hash != theirs.info_hash {
        Err(HandshakeError::MismatchedHash { expected: mine.info_hash, received: theirs.info_hash })
    } else {
        Ok(theirs.peer_id)
    }
}

/// Dials `address` and performs the handshake. The connection is dropped on
/// every path out of this function.
pub(crate) async fn exchange(
    address: &PeerAddress,
    info_hash: &InfoHash,
    client_id: &PeerId,
    config: &ClientConfig,
) -> Result<PeerId, HandshakeError> {
    let mut stream = timeout(config.connect_timeout, TcpStream::connect((address.host.as_str(), address.port)))
        .await
        .map_err(|_| HandshakeError::TimedOut(config.connect_timeout))?
        .map_err(HandshakeError::Unreachable)?;

    timeout(config.handshake_timeout, handshake(&mut stream, info_hash, client_id))
        .await
        .map_err(|_| HandshakeError::TimedOut(config.handshake_timeout))?
}
