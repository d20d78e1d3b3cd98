use std::fmt;

use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::metadata::bencode::{BencodeValue, Dictionary};
use crate::util::to_hex;

/// SHA-1 digest of the bencoded `info` dictionary; identifies the torrent
/// to trackers and peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash(pub [u8; 20]);

impl InfoHash {
    /// Hashes the canonical encoding of `info` as it was decoded, without
    /// reordering or re-typing any of its entries.
    pub fn of(info: &BencodeValue) -> Self {
        let encoded = Vec::from(info);
        InfoHash(Sha1::digest(&encoded).into())
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn url_encoded(&self) -> String {
        percent_encode(&self.0, NON_ALPHANUMERIC).to_string()
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", to_hex(&self.0))
    }
}

#[derive(Debug, Clone)]
pub struct TorrentFile {
    announce: Option<String>,
    announce_list: Vec<Vec<String>>,
    creation_date: Option<u64>,
    comment: Option<String>,
    created_by: Option<String>,
    encoding: Option<String>,

    pub info: FileModeInfo,
    pub num_bytes_per_piece: u64,
    pub piece_hashes: Vec<[u8; 20]>,
    pub hash: InfoHash,
    private: bool,
}

#[derive(Debug, Clone)]
pub enum FileModeInfo {
    Single {filename: String, length: u64, md5sum: Option<[u8; 16]>},
    Multiple {directory: String, files: Vec<MultiFileInfo>},
}

#[derive(Debug, Clone)]
pub struct MultiFileInfo {
    pub length: u64,
    md5sum: Option<[u8; 16]>,
    pub path: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TorrentFileError {
    #[error("key '{0}' does not map to a string")]
    KeyDoesNotMapToString(&'static str),
    #[error("required key '{0}' is missing")]
    MissingRequiredKey(&'static str),
    #[error("key '{0}' does not map to an integer")]
    KeyDoesNotMapToInteger(&'static str),
    #[error("integer value {0} is negative")]
    NegativeInteger(i64),
    #[error("key '{0}' does not map to a dictionary")]
    KeyDoesNotMapToDictionary(&'static str),
    #[error("torrent file is not a dictionary")]
    FileIsNotDictionary,
    #[error("key '{0}' does not map to a list")]
    KeyDoesNotMapToList(&'static str),
    #[error("md5sum has length {0} instead of 16")]
    InvalidMd5Length(usize),
    #[error("private flag must be 0 or 1 but is {0}")]
    InvalidPrivateValue(u64),
    #[error("key '{0}' does not map to a list of dictionaries")]
    KeyDoesNotMapToListOfDictionaries(&'static str),
    #[error("key '{0}' maps to an empty value")]
    KeyMapsToEmptyValue(&'static str),
    #[error("pieces byte length ({0}) is not a non-zero multiple of 20")]
    InvalidNumberOfPieces(usize),
    #[error("announce-list element is neither a list nor a string")]
    InvalidAnnounceListElement,
    #[error("no announce url present in either 'announce' or 'announce-list'")]
    NoAnnounceUrl,
    #[error("info has neither a non-zero 'length' nor a non-empty 'files' list")]
    NoContent,
}

type Result<T> = std::result::Result<T, TorrentFileError>;

impl fmt::Display for FileModeInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FileModeInfo::Single{filename, length, md5sum} => {
                write!(f, "{} ({} bytes", filename, length)?;
                if md5sum.is_some() {
                    write!(f, ", md5 present)")
                } else {
                    write!(f, ")")
                }
            },
            FileModeInfo::Multiple { directory, files } => {
                let file_list = files
                    .iter()
                    .map(|i| format!("{} ({} bytes)", i.path.join("/"), i.length))
                    .collect::<Vec<_>>()
                    .join(", ");

                write!(f, "[{}] -> {}/", file_list, directory)
            }
        }
    }
}

impl fmt::Display for TorrentFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(announce) = &self.announce {
            writeln!(f, "announce: {}", announce)?;
        }
        writeln!(f, "announce list: [{}]", self.announce_list
            .iter()
            .map(|v| format!("[{}]", v.join(", ")))
            .collect::<Vec<_>>()
            .join(", "))?;
        if let Some(date) = &self.creation_date {
            writeln!(f, "created: {} seconds since epoch", date)?;
        }
        if let Some(text) = &self.comment {
            writeln!(f, "comment: {}", text)?;
        }
        if let Some(author) = &self.created_by {
            writeln!(f, "created by: {}", author)?;
        }
        if let Some(e) = &self.encoding {
            writeln!(f, "encoding: {}", e)?;
        }
        writeln!(f, "private: {}", self.private)?;
        writeln!(f, "info hash: {}", self.hash)?;
        writeln!(f, "size: {} bytes ({} pieces of {} bytes each)", self.total_length(), self.piece_hashes.len(), self.num_bytes_per_piece)?;
        writeln!(f, "file(s): {}", self.info)
    }
}

const ANNOUNCE: &[u8] = b"announce";
const ANNOUNCE_LIST: &[u8] = b"announce-list";
const CREATION_DATE: &[u8] = b"creation date";
const COMMENT: &[u8] = b"comment";
const CREATED_BY: &[u8] = b"created by";
const ENCODING: &[u8] = b"encoding";
const INFO: &[u8] = b"info";
const PIECE_LENGTH: &[u8] = b"piece length";
const PIECES: &[u8] = b"pieces";
const PRIVATE: &[u8] = b"private";
const NAME: &[u8] = b"name";
const LENGTH: &[u8] = b"length";
const MD5SUM: &[u8] = b"md5sum";
const FILES: &[u8] = b"files";
const PATH: &[u8] = b"path";

impl TryFrom<&BencodeValue> for TorrentFile {
    type Error = TorrentFileError;

    fn try_from(value: &BencodeValue) -> Result<Self> {
        let items = value.as_dictionary().ok_or(TorrentFileError::FileIsNotDictionary)?;
        let info = items.get(INFO).ok_or(TorrentFileError::MissingRequiredKey("info"))?;
        let info_items = info.as_dictionary().ok_or(TorrentFileError::KeyDoesNotMapToDictionary("info"))?;

        let announce = extract_string(items.get(ANNOUNCE), "announce", false)?
            .filter(|url| !url.is_empty());
        let announce_list = extract_announce_list(items.get(ANNOUNCE_LIST))?;
        if announce.is_none() && announce_list.iter().all(Vec::is_empty) {
            return Err(TorrentFileError::NoAnnounceUrl);
        }

        let name = extract_string(info_items.get(NAME), "name", true)?.unwrap_or_default();
        if name.is_empty() {
            return Err(TorrentFileError::KeyMapsToEmptyValue("name"));
        }
        let num_bytes_per_piece = extract_uint(info_items.get(PIECE_LENGTH), "piece length", true)?.unwrap_or_default();
        if num_bytes_per_piece == 0 {
            return Err(TorrentFileError::KeyMapsToEmptyValue("piece length"));
        }
        let piece_hashes = extract_pieces(info_items.get(PIECES))?;
        let private = match extract_uint(info_items.get(PRIVATE), "private", false)? {
            None | Some(0) => false,
            Some(1) => true,
            Some(v) => return Err(TorrentFileError::InvalidPrivateValue(v)),
        };

        let info_mode = if info_items.contains_key(FILES) {
            let files = extract_files(info_items.get(FILES))?;
            if files.is_empty() {
                return Err(TorrentFileError::NoContent);
            }
            FileModeInfo::Multiple { directory: name, files }
        } else {
            let length = extract_uint(info_items.get(LENGTH), "length", false)?.unwrap_or_default();
            if length == 0 {
                return Err(TorrentFileError::NoContent);
            }
            let md5sum = extract_md5sum(info_items.get(MD5SUM))?;
            FileModeInfo::Single { filename: name, length, md5sum }
        };

        Ok(TorrentFile {
            announce,
            announce_list,
            creation_date: extract_uint(items.get(CREATION_DATE), "creation date", false)?,
            comment: extract_string(items.get(COMMENT), "comment", false)?,
            created_by: extract_string(items.get(CREATED_BY), "created by", false)?,
            encoding: extract_string(items.get(ENCODING), "encoding", false)?,
            info: info_mode,
            num_bytes_per_piece,
            piece_hashes,
            hash: InfoHash::of(info),
            private,
        })
    }
}

impl TorrentFile {
    pub fn name(&self) -> &str {
        match &self.info {
            FileModeInfo::Single { filename, .. } => filename,
            FileModeInfo::Multiple { directory, .. } => directory,
        }
    }

    /// Sum of all file lengths; reported to trackers as `left`.
    pub fn total_length(&self) -> u64 {
        match &self.info {
            FileModeInfo::Single { length, .. } => *length,
            FileModeInfo::Multiple { files, .. } => files.iter().map(|f| f.length).sum(),
        }
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    /// Every announce url: the primary one followed by each tier in order.
    pub fn announce_urls(&self) -> Vec<String> {
        self.announce
            .iter()
            .chain(self.announce_list.iter().flatten())
            .cloned()
            .collect()
    }
}

fn convert_string(value: &BencodeValue) -> Option<String> {
    match value {
        BencodeValue::ByteString(text) => {
            std::str::from_utf8(text).map(str::to_owned).ok()
        },
        _ => None,
    }
}

pub(crate) fn extract_string(value: Option<&BencodeValue>, name: &'static str, mandatory: bool) -> Result<Option<String>> {
    match value {
        Some(v) => convert_string(v).map(Some).ok_or(TorrentFileError::KeyDoesNotMapToString(name)),
        None => if mandatory { Err(TorrentFileError::MissingRequiredKey(name)) } else { Ok(None) },
    }
}

pub(crate) fn extract_uint(value: Option<&BencodeValue>, name: &'static str, mandatory: bool) -> Result<Option<u64>> {
    match value {
        Some(BencodeValue::Integer(num)) => {
            if *num < 0 {
                Err(TorrentFileError::NegativeInteger(*num))
            } else {
                Ok(Some(*num as u64))
            }
        },
        Some(_) => Err(TorrentFileError::KeyDoesNotMapToInteger(name)),
        None => if mandatory { Err(TorrentFileError::MissingRequiredKey(name)) } else { Ok(None) },
    }
}

fn extract_list_of_string(value: Option<&BencodeValue>, name: &'static str, mandatory: bool) -> Result<Vec<String>> {
    match value {
        Some(BencodeValue::List(elements)) => elements
            .iter()
            .map(|element| convert_string(element).ok_or(TorrentFileError::KeyDoesNotMapToString(name)))
            .collect(),
        Some(_) => Err(TorrentFileError::KeyDoesNotMapToList(name)),
        None => if mandatory { Err(TorrentFileError::MissingRequiredKey(name)) } else { Ok(Vec::new()) },
    }
}

fn extract_md5sum(value: Option<&BencodeValue>) -> Result<Option<[u8; 16]>> {
    match value {
        None => Ok(None),
        Some(BencodeValue::ByteString(bytes)) => bytes
            .as_slice()
            .try_into()
            .map(Some)
            .map_err(|_| TorrentFileError::InvalidMd5Length(bytes.len())),
        Some(_) => Err(TorrentFileError::KeyDoesNotMapToString("md5sum")),
    }
}

fn extract_files(value: Option<&BencodeValue>) -> Result<Vec<MultiFileInfo>> {
    match value {
        Some(BencodeValue::List(elements)) => elements
            .iter()
            .map(|element| match element {
                BencodeValue::Dictionary(items) => extract_multi_file_info(items),
                _ => Err(TorrentFileError::KeyDoesNotMapToListOfDictionaries("files")),
            })
            .collect(),
        Some(_) => Err(TorrentFileError::KeyDoesNotMapToListOfDictionaries("files")),
        None => Err(TorrentFileError::MissingRequiredKey("files")),
    }
}

fn extract_multi_file_info(items: &Dictionary) -> Result<MultiFileInfo> {
    let length = extract_uint(items.get(LENGTH), "length", true)?.unwrap_or_default();
    let path: Vec<String> = extract_list_of_string(items.get(PATH), "path", true)?;
    if path.is_empty() {
        return Err(TorrentFileError::KeyMapsToEmptyValue("path"));
    }
    let md5sum = extract_md5sum(items.get(MD5SUM))?;
    Ok(MultiFileInfo { length, md5sum, path })
}

fn extract_announce_list(value: Option<&BencodeValue>) -> Result<Vec<Vec<String>>> {
    match value {
        None => Ok(Vec::new()),
        Some(BencodeValue::List(elements)) => elements
            .iter()
            .map(|element| match element {
                BencodeValue::List(_) => extract_list_of_string(Some(element), "announce-list", false),
                BencodeValue::ByteString(_) => Ok(vec![
                    convert_string(element).ok_or(TorrentFileError::KeyDoesNotMapToString("announce-list"))?
                ]),
                _ => Err(TorrentFileError::InvalidAnnounceListElement),
            })
            .collect(),
        Some(_) => Err(TorrentFileError::KeyDoesNotMapToList("announce-list")),
    }
}

fn extract_pieces(value: Option<&BencodeValue>) -> Result<Vec<[u8; 20]>> {
    match value {
        Some(BencodeValue::ByteString(s)) => {
            if s.is_empty() || s.len() % 20 != 0 {
                return Err(TorrentFileError::InvalidNumberOfPieces(s.len()))
            }
            Ok(s.chunks_exact(20)
                .map(|chunk| {
                    let mut piece = [0u8; 20];
                    piece.copy_from_slice(chunk);
                    piece
                })
                .collect())
        },
        Some(_) => Err(TorrentFileError::KeyDoesNotMapToString("pieces")),
        None => Err(TorrentFileError::MissingRequiredKey("pieces")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> Dictionary {
        [
            ("length", BencodeValue::Integer(1024)),
            ("name", BencodeValue::from("sample.iso")),
            ("piece length", BencodeValue::Integer(512)),
            ("pieces", BencodeValue::ByteString(vec![7u8; 40])),
        ]
        .into_iter()
        .collect()
    }

    fn sample_descriptor(info: Dictionary) -> Dictionary {
        [
            ("announce", BencodeValue::from("http://tracker.example/announce")),
            ("comment", BencodeValue::from("a sample")),
            ("info", BencodeValue::Dictionary(info)),
        ]
        .into_iter()
        .collect()
    }

    fn parse(descriptor: Dictionary) -> Result<TorrentFile> {
        TorrentFile::try_from(&BencodeValue::Dictionary(descriptor))
    }

    fn without(dictionary: Dictionary, key: &[u8]) -> Dictionary {
        dictionary.iter().filter(|(k, _)| *k != key).map(|(k, v)| (k.to_vec(), v.clone())).collect()
    }

    #[test]
    fn it_should_parse_a_single_file_descriptor() {
        let file = parse(sample_descriptor(sample_info())).unwrap();
        assert_eq!(file.name(), "sample.iso");
        assert_eq!(file.total_length(), 1024);
        assert_eq!(file.num_bytes_per_piece, 512);
        assert_eq!(file.piece_hashes, vec![[7u8; 20]; 2]);
        assert_eq!(file.announce_urls(), vec!["http://tracker.example/announce".to_string()]);
        assert!(!file.is_private());
    }

    #[test]
    fn it_should_parse_a_multi_file_descriptor() {
        let file_entry = |length: i64, path: &str| -> BencodeValue {
            BencodeValue::Dictionary(
                [
                    ("length", BencodeValue::Integer(length)),
                    ("path", BencodeValue::List(vec![BencodeValue::from("dir"), BencodeValue::from(path)])),
                ]
                .into_iter()
                .collect(),
            )
        };
        let mut info = without(sample_info(), LENGTH);
        info.insert("files", BencodeValue::List(vec![file_entry(100, "a"), file_entry(28, "b")]));

        let file = parse(sample_descriptor(info)).unwrap();
        assert_eq!(file.name(), "sample.iso");
        assert_eq!(file.total_length(), 128);
        match &file.info {
            FileModeInfo::Multiple { files, .. } => assert_eq!(files[1].path, vec!["dir", "b"]),
            FileModeInfo::Single { .. } => panic!("expected multiple files"),
        }
    }

    #[test]
    fn it_should_collect_announce_urls_from_every_tier() {
        let mut descriptor = without(sample_descriptor(sample_info()), ANNOUNCE);
        descriptor.insert(
            "announce-list",
            BencodeValue::List(vec![
                BencodeValue::List(vec![BencodeValue::from("http://a/announce"), BencodeValue::from("http://b/announce")]),
                BencodeValue::List(vec![BencodeValue::from("udp://c:80")]),
            ]),
        );
        let file = parse(descriptor).unwrap();
        assert_eq!(file.announce_urls(), vec!["http://a/announce", "http://b/announce", "udp://c:80"]);
    }

    #[test]
    fn it_should_require_an_announce_url() {
        let descriptor = without(sample_descriptor(sample_info()), ANNOUNCE);
        assert_eq!(parse(descriptor).unwrap_err(), TorrentFileError::NoAnnounceUrl);
    }

    #[test]
    fn it_should_require_the_mandatory_info_fields() {
        assert_eq!(
            parse(sample_descriptor(without(sample_info(), NAME))).unwrap_err(),
            TorrentFileError::MissingRequiredKey("name")
        );
        assert_eq!(
            parse(sample_descriptor(without(sample_info(), PIECE_LENGTH))).unwrap_err(),
            TorrentFileError::MissingRequiredKey("piece length")
        );
        assert_eq!(
            parse(sample_descriptor(without(sample_info(), PIECES))).unwrap_err(),
            TorrentFileError::MissingRequiredKey("pieces")
        );
        assert_eq!(
            parse(sample_descriptor(without(sample_info(), LENGTH))).unwrap_err(),
            TorrentFileError::NoContent
        );
        assert_eq!(
            parse(without(sample_descriptor(sample_info()), INFO)).unwrap_err(),
            TorrentFileError::MissingRequiredKey("info")
        );
    }

    #[test]
    fn it_should_reject_empty_or_zero_info_values() {
        let mut info = sample_info();
        info.insert("name", BencodeValue::from(""));
        assert_eq!(parse(sample_descriptor(info)).unwrap_err(), TorrentFileError::KeyMapsToEmptyValue("name"));

        let mut info = sample_info();
        info.insert("piece length", BencodeValue::Integer(0));
        assert_eq!(parse(sample_descriptor(info)).unwrap_err(), TorrentFileError::KeyMapsToEmptyValue("piece length"));

        let mut info = sample_info();
        info.insert("pieces", BencodeValue::ByteString(vec![]));
        assert_eq!(parse(sample_descriptor(info)).unwrap_err(), TorrentFileError::InvalidNumberOfPieces(0));

        let mut info = sample_info();
        info.insert("pieces", BencodeValue::ByteString(vec![1; 21]));
        assert_eq!(parse(sample_descriptor(info)).unwrap_err(), TorrentFileError::InvalidNumberOfPieces(21));
    }

    #[test]
    fn it_should_hash_exactly_the_encoded_info_dictionary() {
        let descriptor = sample_descriptor(sample_info());
        let file = parse(descriptor.clone()).unwrap();
        let encoded_info = Vec::from(&BencodeValue::Dictionary(sample_info()));
        let expected: [u8; 20] = Sha1::digest(&encoded_info).into();
        assert_eq!(file.hash, InfoHash(expected));
        assert_eq!(parse(descriptor).unwrap().hash, file.hash);
    }

    #[test]
    fn it_should_change_the_hash_when_any_info_field_changes() {
        let original = parse(sample_descriptor(sample_info())).unwrap().hash;

        let mut info = sample_info();
        info.insert("length", BencodeValue::Integer(1025));
        assert_ne!(parse(sample_descriptor(info)).unwrap().hash, original);

        let mut descriptor = sample_descriptor(sample_info());
        descriptor.insert("comment", BencodeValue::from("a different comment"));
        assert_eq!(parse(descriptor).unwrap().hash, original);
    }

    #[test]
    fn it_should_hash_info_keys_in_their_original_order() {
        let reordered: Dictionary = sample_info()
            .iter()
            .rev()
            .map(|(k, v)| (k.to_vec(), v.clone()))
            .collect();
        let original = parse(sample_descriptor(sample_info())).unwrap().hash;
        let file = parse(sample_descriptor(reordered.clone())).unwrap();
        assert_ne!(file.hash, original);
        assert_eq!(file.hash, InfoHash::of(&BencodeValue::Dictionary(reordered)));
    }

    #[test]
    fn it_should_percent_encode_the_info_hash() {
        let hash = InfoHash([0x12, 0x34, b'a', b'.', 0xff, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(hash.url_encoded().starts_with("%124a%2E%FF%00"));
    }
}
