//! Minimal Solidity ABI codec for the registry and badge contracts.
//!
//! Only the shapes the contracts actually use are supported: `uint256` values
//! that fit in a `u64`, `address`, `bool`, `string`, `address[]` and
//! head/tail encoded tuples of those.

use crate::error::{Error, Result};
use sha3::{Digest, Keccak256};
use std::fmt;

const WORD: usize = 32;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// First four bytes of the keccak hash of a canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// A 20-byte account address held in its EIP-55 checksummed form.
///
/// Equality is plain string equality on that form, which is the casing the
/// wallet reports for the connected account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    pub fn parse(input: &str) -> Result<Self> {
        let hex_part = input
            .strip_prefix("0x")
            .or_else(|| input.strip_prefix("0X"))
            .ok_or_else(|| Error::Precondition(format!("address '{input}' must start with 0x")))?;
        if hex_part.len() != 40 {
            return Err(Error::Precondition(format!(
                "address '{input}' must have 40 hex digits"
            )));
        }
        let bytes = hex::decode(hex_part)
            .map_err(|e| Error::Precondition(format!("address '{input}' is not hex: {e}")))?;
        let mut raw = [0u8; 20];
        raw.copy_from_slice(&bytes);
        Ok(Self::from_bytes(raw))
    }

    pub fn from_bytes(raw: [u8; 20]) -> Self {
        let lower = hex::encode(raw);
        let hash = keccak256(lower.as_bytes());
        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = (hash[i / 2] >> if i % 2 == 0 { 4 } else { 0 }) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        Address(out)
    }

    pub fn zero() -> Self {
        Self::from_bytes([0u8; 20])
    }

    pub fn to_bytes(&self) -> [u8; 20] {
        let mut raw = [0u8; 20];
        // Constructed only from validated hex, so decoding cannot fail.
        if let Ok(bytes) = hex::decode(&self.0[2..]) {
            raw.copy_from_slice(&bytes);
        }
        raw
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A call argument.
#[derive(Debug, Clone)]
pub enum Token {
    Uint(u64),
    Address(Address),
    String(String),
}

fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

/// Selector followed by the head/tail encoding of `args`.
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut head = Vec::with_capacity(args.len() * WORD);
    let mut tail = Vec::new();
    let head_size = args.len() * WORD;

    for arg in args {
        match arg {
            Token::Uint(v) => head.extend_from_slice(&uint_word(*v)),
            Token::Address(addr) => {
                let mut word = [0u8; WORD];
                word[12..].copy_from_slice(&addr.to_bytes());
                head.extend_from_slice(&word);
            }
            Token::String(s) => {
                head.extend_from_slice(&uint_word((head_size + tail.len()) as u64));
                tail.extend_from_slice(&uint_word(s.len() as u64));
                let start = tail.len();
                tail.extend_from_slice(s.as_bytes());
                tail.resize(start + padded_len(s.len()), 0);
            }
        }
    }

    let mut out = Vec::with_capacity(4 + head.len() + tail.len());
    out.extend_from_slice(&selector(signature));
    out.extend_from_slice(&head);
    out.extend_from_slice(&tail);
    out
}

/// Reads return data. Slot positions are word indices relative to the start
/// of the enclosing tuple; offsets inside dynamic values are resolved
/// against that same base.
pub struct Decoder<'a> {
    data: &'a [u8],
    base: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, base: 0 }
    }

    fn word_at(&self, byte_pos: usize) -> Result<&'a [u8]> {
        let end = byte_pos
            .checked_add(WORD)
            .ok_or_else(|| Error::Decode(format!("word at byte {byte_pos} is out of range")))?;
        self.data.get(byte_pos..end).ok_or_else(|| {
            Error::Decode(format!(
                "return data too short: need word at byte {byte_pos}, have {} bytes",
                self.data.len()
            ))
        })
    }

    fn u64_at(&self, byte_pos: usize) -> Result<u64> {
        let word = self.word_at(byte_pos)?;
        if word[..WORD - 8].iter().any(|b| *b != 0) {
            return Err(Error::Decode(format!(
                "uint256 at byte {byte_pos} does not fit in 64 bits"
            )));
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&word[WORD - 8..]);
        Ok(u64::from_be_bytes(buf))
    }

    /// A length or offset word, which must also be addressable.
    fn usize_at(&self, byte_pos: usize) -> Result<usize> {
        let value = self.u64_at(byte_pos)?;
        usize::try_from(value)
            .map_err(|_| Error::Decode(format!("value {value} at byte {byte_pos} is out of range")))
    }

    fn slot(&self, index: usize) -> Result<usize> {
        index
            .checked_mul(WORD)
            .and_then(|offset| self.base.checked_add(offset))
            .ok_or_else(|| Error::Decode(format!("slot {index} is out of range")))
    }

    /// Absolute byte position a dynamic value's offset word points at.
    fn follow(&self, index: usize) -> Result<usize> {
        let offset = self.usize_at(self.slot(index)?)?;
        match self.base.checked_add(offset) {
            Some(target) if target <= self.data.len() => Ok(target),
            _ => Err(Error::Decode(format!(
                "offset {offset} in slot {index} points past end of data"
            ))),
        }
    }

    /// Start and length of the body of a length-prefixed value in `index`.
    fn dynamic(&self, index: usize) -> Result<(usize, usize)> {
        let start = self.follow(index)?;
        let len = self.usize_at(start)?;
        let body = start
            .checked_add(WORD)
            .ok_or_else(|| Error::Decode(format!("value in slot {index} is out of range")))?;
        Ok((body, len))
    }

    pub fn uint(&self, index: usize) -> Result<u64> {
        self.u64_at(self.slot(index)?)
    }

    pub fn boolean(&self, index: usize) -> Result<bool> {
        match self.uint(index)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::Decode(format!(
                "bool in slot {index} has value {other}"
            ))),
        }
    }

    fn address_at(&self, byte_pos: usize) -> Result<Address> {
        let word = self.word_at(byte_pos)?;
        if word[..12].iter().any(|b| *b != 0) {
            return Err(Error::Decode(format!(
                "address at byte {byte_pos} has dirty high bytes"
            )));
        }
        let mut raw = [0u8; 20];
        raw.copy_from_slice(&word[12..]);
        Ok(Address::from_bytes(raw))
    }

    pub fn address(&self, index: usize) -> Result<Address> {
        self.address_at(self.slot(index)?)
    }

    pub fn string(&self, index: usize) -> Result<String> {
        let (body, len) = self.dynamic(index)?;
        let bytes = body
            .checked_add(len)
            .and_then(|end| self.data.get(body..end))
            .ok_or_else(|| Error::Decode(format!("string in slot {index} truncated")))?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Decode(format!("string in slot {index} is not utf-8: {e}")))
    }

    pub fn address_array(&self, index: usize) -> Result<Vec<Address>> {
        let (body, len) = self.dynamic(index)?;
        let fits = len
            .checked_mul(WORD)
            .and_then(|size| body.checked_add(size))
            .is_some_and(|end| end <= self.data.len());
        if !fits {
            return Err(Error::Decode(format!(
                "address[] in slot {index} claims {len} entries past end of data"
            )));
        }
        (0..len)
            .map(|i| self.address_at(body + i * WORD))
            .collect()
    }

    /// Descend into a dynamic tuple whose offset sits in `index`.
    pub fn tuple(&self, index: usize) -> Result<Decoder<'a>> {
        let start = self.follow(index)?;
        Ok(Decoder {
            data: self.data,
            base: start,
        })
    }
}

/// Parse a `0x`-prefixed hex string as returned by JSON-RPC.
pub fn decode_hex(input: &str) -> Result<Vec<u8>> {
    let stripped = input.strip_prefix("0x").unwrap_or(input);
    hex::decode(stripped).map_err(|e| Error::Decode(format!("invalid hex '{input}': {e}")))
}

pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
