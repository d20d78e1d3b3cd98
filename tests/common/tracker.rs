use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use torrent::{BencodeValue, Dictionary, PeerAddress};

/// An HTTP tracker that answers every request with the same bencoded body and
/// remembers the request targets it saw.
pub struct MockTracker {
    pub announce_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockTracker {
    pub async fn serve(body: Vec<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                let body = body.clone();
                let seen = seen.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&request).into_owned();
                    if let Some(target) = head.split_whitespace().nth(1) {
                        seen.lock().unwrap().push(target.to_string());
                    }
                    let header = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(header.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        MockTracker { announce_url: format!("http://127.0.0.1:{port}/announce"), requests }
    }

    pub async fn with_peers(interval: i64, peers: &[PeerAddress]) -> Self {
        Self::serve(peer_list_body(interval, peers)).await
    }

    pub async fn failing(reason: &str) -> Self {
        let body: Dictionary = [("failure reason", BencodeValue::from(reason))].into_iter().collect();
        Self::serve(Vec::from(&BencodeValue::Dictionary(body))).await
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn peer_list_body(interval: i64, peers: &[PeerAddress]) -> Vec<u8> {
    let peers = peers
        .iter()
        .enumerate()
        .map(|(i, peer)| {
            let entry: Dictionary = [
                ("ip", BencodeValue::from(peer.host.as_str())),
                ("peer id", BencodeValue::ByteString(vec![i as u8; 20])),
                ("port", BencodeValue::Integer(i64::from(peer.port))),
            ]
            .into_iter()
            .collect();
            BencodeValue::Dictionary(entry)
        })
        .collect();
    let body: Dictionary = [
        ("interval", BencodeValue::Integer(interval)),
        ("peers", BencodeValue::List(peers)),
    ]
    .into_iter()
    .collect();
    Vec::from(&BencodeValue::Dictionary(body))
}

/// An http url on which nothing is listening.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/announce")
}
