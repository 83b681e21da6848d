//! Canonical tuple encoding for signed payloads
//!
//! Follows the Ethereum contract ABI head/tail layout so that signatures
//! produced by standard wallet tooling over `keccak(abi.encode(...))` verify
//! unchanged. Only the token types the signed messages use are supported.

use super::address::Address;
use super::hash::Hash;

/// ABI word size
const WORD: usize = 32;

/// A value to encode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Unsigned integer, left-padded to one word
    Uint(u128),
    /// Address, left-padded to one word
    Address(Address),
    /// Dynamic UTF-8 string
    String(&'a str),
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 20..].copy_from_slice(address.as_bytes());
    word
}

/// `abi.encode(tokens...)`
pub fn encode(tokens: &[Token<'_>]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            Token::Uint(value) => head.extend_from_slice(&uint_word(*value)),
            Token::Address(address) => head.extend_from_slice(&address_word(address)),
            Token::String(s) => {
                let offset = (head_len + tail.len()) as u128;
                head.extend_from_slice(&uint_word(offset));

                let bytes = s.as_bytes();
                tail.extend_from_slice(&uint_word(bytes.len() as u128));
                tail.extend_from_slice(bytes);
                let padding = (WORD - bytes.len() % WORD) % WORD;
                tail.extend(std::iter::repeat(0u8).take(padding));
            }
        }
    }

    head.extend_from_slice(&tail);
    head
}

/// `keccak256(abi.encode(tokens...))`
pub fn encode_and_hash(tokens: &[Token<'_>]) -> Hash {
    Hash::keccak(&encode(tokens))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_layout() {
        let encoded = encode(&[Token::Uint(1), Token::Address(Address([0xab; 20]))]);
        assert_eq!(encoded.len(), 64);
        assert_eq!(encoded[31], 1);
        assert_eq!(&encoded[32..44], &[0u8; 12]);
        assert_eq!(&encoded[44..64], &[0xab; 20]);
    }

    #[test]
    fn test_string_then_address_layout() {
        // abi.encode("abc", address(0x01..))
        let encoded = encode(&[Token::String("abc"), Token::Address(Address([1u8; 20]))]);
        assert_eq!(encoded.len(), 4 * WORD);
        // offset of the string payload is 0x40
        assert_eq!(encoded[31], 0x40);
        assert_eq!(&encoded[44..64], &[1u8; 20]);
        // length word
        assert_eq!(encoded[95], 3);
        assert_eq!(&encoded[96..99], b"abc");
        assert!(encoded[99..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_word_aligned_string_has_no_padding() {
        let s = "a".repeat(32);
        let encoded = encode(&[Token::String(&s)]);
        assert_eq!(encoded.len(), 3 * WORD);
    }
}
