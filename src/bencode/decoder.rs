use super::BencodeValue;
use crate::error::{BittorrentError, Result};

/// Deepest list/dict nesting accepted before decoding gives up
const MAX_DEPTH: usize = 64;

/// Decode bencoded data into a BencodeValue.
///
/// The whole input must be exactly one value; trailing bytes are rejected.
pub fn decode(data: &[u8]) -> Result<BencodeValue> {
    let (value, consumed) = decode_prefix(data)?;
    if consumed != data.len() {
        return Err(malformed(format!(
            "{} trailing bytes after value",
            data.len() - consumed
        )));
    }
    Ok(value)
}

/// Decode the first value in `data`, returning it with the number of bytes it
/// occupied.
pub fn decode_prefix(data: &[u8]) -> Result<(BencodeValue, usize)> {
    decode_value(data, 0)
}

fn malformed(msg: impl Into<String>) -> BittorrentError {
    BittorrentError::MalformedEncoding(msg.into())
}

// Every decoder below works on the slice starting at its own first byte and
// reports how much of it was consumed. Callers advance by that count; nothing
// ever scans ahead for an 'e'.
fn decode_value(data: &[u8], depth: usize) -> Result<(BencodeValue, usize)> {
    if depth > MAX_DEPTH {
        return Err(malformed("nesting too deep"));
    }

    match data.first() {
        None => Err(malformed("unexpected end of input")),
        Some(b'i') => decode_integer(data),
        Some(b'l') => decode_list(data, depth),
        Some(b'd') => decode_dict(data, depth),
        Some(b'0'..=b'9') => {
            let (bytes, used) = decode_string(data)?;
            Ok((BencodeValue::String(bytes), used))
        }
        Some(&c) => Err(malformed(format!("invalid bencode token: {:?}", c as char))),
    }
}

/// Validates an unsigned decimal with no superfluous leading zero.
fn check_digits(digits: &[u8], what: &str) -> Result<()> {
    if digits.is_empty() {
        return Err(malformed(format!("empty {}", what)));
    }
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(malformed(format!("non-digit in {}", what)));
    }
    if digits.len() > 1 && digits[0] == b'0' {
        return Err(malformed(format!("leading zero in {}", what)));
    }
    Ok(())
}

fn decode_integer(data: &[u8]) -> Result<(BencodeValue, usize)> {
    // Skip 'i'
    let body = &data[1..];
    let end = body
        .iter()
        .position(|&b| b == b'e')
        .ok_or_else(|| malformed("unterminated integer"))?;
    let text = &body[..end];

    let digits = match text.first() {
        Some(b'-') => &text[1..],
        _ => text,
    };
    check_digits(digits, "integer")?;
    if text[0] == b'-' && digits == b"0" {
        return Err(malformed("negative zero"));
    }

    // ASCII-only at this point, so from_utf8 cannot fail.
    let num = std::str::from_utf8(text)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| malformed("integer out of range"))?;

    // 'i' + digits + 'e'
    Ok((BencodeValue::Integer(num), end + 2))
}

fn decode_string(data: &[u8]) -> Result<(Vec<u8>, usize)> {
    let colon = data
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| malformed("missing ':' after string length"))?;
    let len_digits = &data[..colon];
    check_digits(len_digits, "string length")?;

    let len = std::str::from_utf8(len_digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| malformed("string length out of range"))?;

    let start = colon + 1;
    let end = start
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| malformed("string length exceeds data"))?;

    Ok((data[start..end].to_vec(), end))
}

fn decode_list(data: &[u8], depth: usize) -> Result<(BencodeValue, usize)> {
    // Skip 'l'
    let mut pos = 1;
    let mut list = Vec::new();

    loop {
        match data.get(pos) {
            None => return Err(malformed("unterminated list")),
            Some(b'e') => break,
            Some(_) => {
                let (item, used) = decode_value(&data[pos..], depth + 1)?;
                list.push(item);
                pos += used;
            }
        }
    }

    Ok((BencodeValue::List(list), pos + 1))
}

fn decode_dict(data: &[u8], depth: usize) -> Result<(BencodeValue, usize)> {
    // Skip 'd'
    let mut pos = 1;
    let mut dict: Vec<(Vec<u8>, BencodeValue)> = Vec::new();

    loop {
        match data.get(pos) {
            None => return Err(malformed("unterminated dictionary")),
            Some(b'e') => break,
            Some(b'0'..=b'9') => {
                let (key, used) = decode_string(&data[pos..])?;
                pos += used;

                let (value, used) = decode_value(&data[pos..], depth + 1)?;
                pos += used;

                // A repeated key overwrites the earlier value but keeps its slot.
                match dict.iter_mut().find(|(k, _)| *k == key) {
                    Some(entry) => entry.1 = value,
                    None => dict.push((key, value)),
                }
            }
            Some(_) => return Err(malformed("dictionary key must be a string")),
        }
    }

    Ok((BencodeValue::Dict(dict), pos + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(s: &[u8]) -> BencodeValue {
        BencodeValue::String(s.to_vec())
    }

    #[test]
    fn test_decode_integers() {
        assert_eq!(decode(b"i0e").unwrap(), BencodeValue::Integer(0));
        assert_eq!(decode(b"i-42e").unwrap(), BencodeValue::Integer(-42));
        assert_eq!(decode(b"i52e").unwrap(), BencodeValue::Integer(52));
        assert_eq!(
            decode(b"i9223372036854775807e").unwrap(),
            BencodeValue::Integer(i64::MAX)
        );
    }

    #[test]
    fn test_decode_invalid_integers() {
        for raw in [
            &b"i03e"[..],
            b"i-0e",
            b"ie",
            b"i-e",
            b"i4x2e",
            b"i+4e",
            b"i42",
            b"i99999999999999999999e",
        ] {
            let err = decode(raw).unwrap_err();
            assert!(
                matches!(err, BittorrentError::MalformedEncoding(_)),
                "{:?} should be malformed",
                String::from_utf8_lossy(raw)
            );
        }
    }

    #[test]
    fn test_decode_string_with_structural_bytes() {
        assert_eq!(decode(b"5:ile:d").unwrap(), string(b"ile:d"));
        assert_eq!(decode(b"0:").unwrap(), string(b""));

        // A string full of 'e' inside a list must not end the list early.
        let value = decode(b"l3:eeei7ee").unwrap();
        assert_eq!(
            value,
            BencodeValue::List(vec![string(b"eee"), BencodeValue::Integer(7)])
        );
    }

    #[test]
    fn test_decode_invalid_strings() {
        assert!(decode(b"05:hello").is_err());
        assert!(decode(b"5:hi").is_err());
        assert!(decode(b"5hello").is_err());
        assert!(decode(b"18446744073709551616:x").is_err());
    }

    #[test]
    fn test_decode_nested() {
        let value = decode(b"d4:listl1:ai1eld1:xleeee3:numi-3ee").unwrap();
        let list = match value.dict_get(b"list") {
            Some(BencodeValue::List(list)) => list,
            other => panic!("expected list, got {:?}", other),
        };
        assert_eq!(list.len(), 3);
        assert_eq!(list[0], string(b"a"));
        assert_eq!(
            list[2],
            BencodeValue::List(vec![BencodeValue::Dict(vec![(
                b"x".to_vec(),
                BencodeValue::List(vec![])
            )])])
        );
        assert_eq!(value.dict_get_int(b"num"), Some(-3));
    }

    #[test]
    fn test_decode_dict_keeps_insertion_order() {
        let value = decode(b"d3:zoo1:a3:abc1:be").unwrap();
        let keys: Vec<&[u8]> = value
            .as_dict()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_slice())
            .collect();
        assert_eq!(keys, vec![&b"zoo"[..], &b"abc"[..]]);
    }

    #[test]
    fn test_decode_duplicate_key_replaces_in_place() {
        let value = decode(b"d1:ai1e1:bi2e1:ai3ee").unwrap();
        assert_eq!(
            value,
            BencodeValue::Dict(vec![
                (b"a".to_vec(), BencodeValue::Integer(3)),
                (b"b".to_vec(), BencodeValue::Integer(2)),
            ])
        );
    }

    #[test]
    fn test_decode_rejects_bad_structure() {
        assert!(decode(b"").is_err());
        assert!(decode(b"l4:spam").is_err());
        assert!(decode(b"di1ei2ee").is_err());
        assert!(decode(b"d3:fooe").is_err());
        assert!(decode(b"x").is_err());
        assert!(decode(b"i1ei2e").is_err());
    }

    #[test]
    fn test_decode_rejects_deep_nesting() {
        let err = decode(&vec![b'l'; 1 << 20]).unwrap_err();
        assert!(matches!(
            err,
            BittorrentError::MalformedEncoding(ref msg) if msg == "nesting too deep"
        ));

        // MAX_DEPTH levels below the top-level list still decode
        let mut nested = vec![b'l'; MAX_DEPTH + 1];
        nested.extend(vec![b'e'; MAX_DEPTH + 1]);
        assert!(decode(&nested).is_ok());

        let mut too_deep = vec![b'l'; MAX_DEPTH + 2];
        too_deep.extend(vec![b'e'; MAX_DEPTH + 2]);
        assert!(decode(&too_deep).is_err());
    }

    #[test]
    fn test_decode_prefix_reports_consumed() {
        let (value, used) = decode_prefix(b"l1:xei99e").unwrap();
        assert_eq!(value, BencodeValue::List(vec![string(b"x")]));
        assert_eq!(used, 5);
    }
}
