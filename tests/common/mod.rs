pub mod logging;
pub mod peer;
pub mod tracker;

use std::path::PathBuf;

use tempfile::TempDir;
use torrent::{BencodeValue, Dictionary};

pub const SAMPLE_LENGTH: i64 = 32768;

pub fn sample_info() -> Dictionary {
    [
        ("length", BencodeValue::Integer(SAMPLE_LENGTH)),
        ("name", BencodeValue::from("sample.bin")),
        ("piece length", BencodeValue::Integer(16384)),
        ("pieces", BencodeValue::ByteString(vec![0xAA; 40])),
    ]
    .into_iter()
    .collect()
}

/// A descriptor announcing to `announce`, plus every url in `tiers` as one tier each.
pub fn sample_descriptor(announce: &str, tiers: &[&str]) -> BencodeValue {
    let mut descriptor: Dictionary = [
        ("announce", BencodeValue::from(announce)),
        ("created by", BencodeValue::from("integration tests")),
        ("info", BencodeValue::Dictionary(sample_info())),
    ]
    .into_iter()
    .collect();
    if !tiers.is_empty() {
        let list = tiers
            .iter()
            .map(|url| BencodeValue::List(vec![BencodeValue::from(*url)]))
            .collect();
        descriptor.insert("announce-list", BencodeValue::List(list));
    }
    BencodeValue::Dictionary(descriptor)
}

/// Writes `contents` to a file inside a fresh temporary directory. The
/// directory lives as long as the returned guard.
pub fn write_torrent_file(contents: &[u8]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.torrent");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}
