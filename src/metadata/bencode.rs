use std::fmt;

use thiserror::Error;

/// Deepest list/dictionary nesting the parser will follow.
pub const MAX_DEPTH: usize = 64;

/// A decoded bencode value. Dictionaries keep their keys in the order they
/// were read so that re-encoding reproduces the original bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    Integer(i64),
    ByteString(Vec<u8>),
    List(Vec<BencodeValue>),
    Dictionary(Dictionary),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    items: Vec<(Vec<u8>, BencodeValue)>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BencodeError {
    #[error("{num_remaining} bytes remain after the top-level value")]
    UnconsumedContents { num_remaining: usize },
    #[error("contents ended before the value was complete")]
    InsufficientContents,
    #[error("unknown type specifier {value:#04x} at position {pos}")]
    UnknownType { pos: usize, value: u8 },
    #[error("integer at position {pos} has leading zeros")]
    IntegerWithLeadingZeros { pos: usize },
    #[error("integer at position {pos} has no digits")]
    EmptyInteger { pos: usize },
    #[error("integer at position {pos} is not representable")]
    IllegalInteger { pos: usize },
    #[error("value at position {pos} is missing its 'e' terminator")]
    UnterminatedValue { pos: usize },
    #[error("string at position {pos} is missing the ':' separator")]
    StringMissingSeparator { pos: usize },
    #[error("dictionary key '{name}' appears more than once")]
    DuplicateDictionaryKey { name: String },
    #[error("value at position {pos} is nested more than {MAX_DEPTH} levels deep")]
    NestingTooDeep { pos: usize },
}

type Result<T> = std::result::Result<T, BencodeError>;

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &[u8]) -> Option<&BencodeValue> {
        self.items.iter().find(|(k, _)| k.as_slice() == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Appends `key`, replacing the value in place if the key is already present.
    pub fn insert<K: Into<Vec<u8>>>(&mut self, key: K, value: BencodeValue) {
        let key = key.into();
        match self.items.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.items.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&[u8], &BencodeValue)> {
        self.items.iter().map(|(k, v)| (k.as_slice(), v))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K: Into<Vec<u8>>> FromIterator<(K, BencodeValue)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (K, BencodeValue)>>(iter: I) -> Self {
        let mut dictionary = Dictionary::new();
        for (key, value) in iter {
            dictionary.insert(key, value);
        }
        dictionary
    }
}

impl From<&str> for BencodeValue {
    fn from(s: &str) -> Self {
        BencodeValue::ByteString(s.as_bytes().to_vec())
    }
}

impl From<i64> for BencodeValue {
    fn from(i: i64) -> Self {
        BencodeValue::Integer(i)
    }
}

fn write_bytes(bytes: &[u8], f: &mut fmt::Formatter) -> fmt::Result {
    for byte in bytes {
        write!(f, "{:02X}", byte)?;
    }
    Ok(())
}

fn write_byte_string(bytes: &[u8], f: &mut fmt::Formatter) -> fmt::Result {
    match std::str::from_utf8(bytes) {
        Ok(s) if bytes.iter().all(|&byte| (0x20..=0x7e).contains(&byte)) => write!(f, "{}", s),
        _ => write_bytes(bytes, f),
    }
}

impl fmt::Display for BencodeValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BencodeValue::Integer(num) => write!(f, "{}", num),
            BencodeValue::ByteString(bytes) => write_byte_string(bytes, f),
            BencodeValue::List(elements) => {
                write!(f, "[")?;
                for element in elements {
                    writeln!(f, "{}", element)?;
                }
                write!(f, "]")
            },
            BencodeValue::Dictionary(items) => {
                write!(f, "{{")?;
                for (key, value) in items.iter() {
                    write_byte_string(key, f)?;
                    writeln!(f, " => {}", value)?;
                }
                write!(f, "}}")
            },
        }
    }
}

impl TryFrom<&[u8]> for BencodeValue {
    type Error = BencodeError;
    fn try_from(bytes: &[u8]) -> Result<Self> {
        let mut parser = BencodeParser::new(bytes);
        parser.deserialize()
    }
}

impl BencodeValue {
    /// Canonical encoding: no whitespace, minimal integers, length-prefixed
    /// strings and dictionary keys in their stored order.
    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            BencodeValue::Integer(i) => out.extend(format!("i{}e", i).as_bytes()),
            BencodeValue::ByteString(bytes) => encode_byte_string(bytes, out),
            BencodeValue::List(elements) => {
                out.push(b'l');
                for element in elements {
                    element.encode_into(out);
                }
                out.push(b'e');
            },
            BencodeValue::Dictionary(items) => {
                out.push(b'd');
                for (key, value) in items.iter() {
                    encode_byte_string(key, out);
                    value.encode_into(out);
                }
                out.push(b'e');
            },
        }
    }

    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            BencodeValue::Dictionary(items) => Some(items),
            _ => None,
        }
    }
}

fn encode_byte_string(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend(format!("{}:", bytes.len()).as_bytes());
    out.extend_from_slice(bytes);
}

impl From<&BencodeValue> for Vec<u8> {
    fn from(value: &BencodeValue) -> Vec<u8> {
        let mut v = Vec::new();
        value.encode_into(&mut v);
        v
    }
}

#[derive(Debug)]
struct BencodeParser<'a> {
    contents: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> BencodeParser<'a> {

    fn new(contents: &'a [u8]) -> Self {
        Self { contents, pos: 0, depth: 0 }
    }

    fn deserialize(&mut self) -> Result<BencodeValue> {
        let value: BencodeValue = self.parse_value()?;
        if self.pos != self.contents.len() {
            Err(BencodeError::UnconsumedContents { num_remaining: self.contents.len() - self.pos })
        } else {
            Ok(value)
        }
    }

    fn parse_value(&mut self) -> Result<BencodeValue> {
        let first: u8 = self.peek()?;
        match first {
            b'i' => self.parse_integer(),
            b'l' => self.parse_list(),
            b'd' => self.parse_dictionary(),
            b'0'..=b'9' => self.parse_string().map(BencodeValue::ByteString),
            _ => Err(BencodeError::UnknownType { pos: self.pos, value: first }),
        }
    }

    fn parse_integer_value(&mut self) -> Result<i64> {
        let start = self.pos;
        while self.peek()?.is_ascii_digit() {
            self.pos += 1;
        }
        let slice = &self.contents[start..self.pos];
        if slice.is_empty() {
            return Err(BencodeError::EmptyInteger { pos: start });
        }
        if slice[0] == b'0' && slice.len() > 1 {
            return Err(BencodeError::IntegerWithLeadingZeros { pos: start });
        }

        let s = std::str::from_utf8(slice).map_err(|_| BencodeError::IllegalInteger { pos: start })?;
        s.parse::<i64>().map_err(|_| BencodeError::IllegalInteger { pos: start })
    }

    fn parse_integer(&mut self) -> Result<BencodeValue> {
        self.pos += 1;
        let mut sign: i64 = 1;
        if self.peek()? == b'-' {
            sign = -1;
            self.pos += 1;
        }
        let value: i64 = self.parse_integer_value()?;
        if value == 0 && sign == -1 {
            return Err(BencodeError::IllegalInteger { pos: self.pos })
        }
        self.expect_end()?;
        self.pos += 1;
        Ok(BencodeValue::Integer(sign * value))
    }

    fn parse_string(&mut self) -> Result<Vec<u8>> {
        let start = self.pos;
        let length = usize::try_from(self.parse_integer_value()?)
            .map_err(|_| BencodeError::IllegalInteger { pos: start })?;
        if self.peek()? != b':' {
            return Err(BencodeError::StringMissingSeparator { pos: self.pos })
        }
        self.pos += 1;
        let end = self.pos.checked_add(length).ok_or(BencodeError::InsufficientContents)?;
        if end > self.contents.len() {
            return Err(BencodeError::InsufficientContents);
        }
        let bytes = self.contents[self.pos..end].to_vec();
        self.pos = end;
        Ok(bytes)
    }

    fn parse_list(&mut self) -> Result<BencodeValue> {
        self.enter()?;
        let mut values: Vec<BencodeValue> = Vec::new();
        while self.peek()? != b'e' {
            values.push(self.parse_value()?);
        }
        self.leave();
        Ok(BencodeValue::List(values))
    }

    fn parse_dictionary(&mut self) -> Result<BencodeValue> {
        self.enter()?;
        let mut dictionary = Dictionary::new();
        while self.peek()? != b'e' {
            let key = self.parse_string()?;
            if dictionary.contains_key(&key) {
                return Err(BencodeError::DuplicateDictionaryKey { name: String::from_utf8_lossy(&key).into_owned() })
            }
            let value: BencodeValue = self.parse_value()?;
            dictionary.items.push((key, value));
        }
        self.leave();
        Ok(BencodeValue::Dictionary(dictionary))
    }

    /// Steps over the opening 'l' or 'd' of a container.
    fn enter(&mut self) -> Result<()> {
        if self.depth >= MAX_DEPTH {
            return Err(BencodeError::NestingTooDeep { pos: self.pos });
        }
        self.depth += 1;
        self.pos += 1;
        Ok(())
    }

    /// Steps over the closing 'e' of a container.
    fn leave(&mut self) {
        self.depth -= 1;
        self.pos += 1;
    }

    fn peek(&self) -> Result<u8> {
        self.contents.get(self.pos).copied().ok_or(BencodeError::InsufficientContents)
    }

    fn expect_end(&self) -> Result<()> {
        if self.peek()? != b'e' {
            Err(BencodeError::UnterminatedValue { pos: self.pos })
        } else {
            Ok(())
        }
    }
}
