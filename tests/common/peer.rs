use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use torrent::{PeerAddress, PeerId, HANDSHAKE_LENGTH};

#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    /// Echoes the requested info hash back with its own id.
    Complete(PeerId),
    /// Answers with an info hash that is not the one requested.
    WrongHash(PeerId),
    /// Accepts the connection and never writes anything.
    Silent,
}

/// Starts a peer on an ephemeral local port and returns its address.
pub async fn spawn_peer(behaviour: Behaviour) -> PeerAddress {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                let mut request = [0u8; HANDSHAKE_LENGTH];
                if socket.read_exact(&mut request).await.is_err() {
                    return;
                }
                let mut response = request;
                match behaviour {
                    Behaviour::Complete(id) => response[48..68].copy_from_slice(&id.0),
                    Behaviour::WrongHash(id) => {
                        for byte in &mut response[28..48] {
                            *byte = !*byte;
                        }
                        response[48..68].copy_from_slice(&id.0);
                    },
                    Behaviour::Silent => {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        return;
                    },
                }
                let _ = socket.write_all(&response).await;
            });
        }
    });

    PeerAddress::new("127.0.0.1", port)
}
