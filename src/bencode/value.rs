use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Dictionary entries in the order they were decoded or inserted.
///
/// Re-encoding walks this order as-is, so a decoded dictionary encodes back to
/// the same bytes it came from.
pub type Dict = Vec<(Vec<u8>, BencodeValue)>;

/// Represents a bencoded value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    /// Integer: i<number>e
    Integer(i64),
    /// Byte string: <length>:<contents>
    String(Vec<u8>),
    /// List: l<values>e
    List(Vec<BencodeValue>),
    /// Dictionary: d<key-value pairs>e (insertion order, never sorted)
    Dict(Dict),
}

impl BencodeValue {
    /// Try to get this value as an integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            BencodeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get this value as a byte string
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a UTF-8 string
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Try to get this value as a dictionary
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            BencodeValue::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Get a value from a dictionary by key
    pub fn dict_get(&self, key: &[u8]) -> Option<&BencodeValue> {
        self.as_dict()?
            .iter()
            .find(|(k, _)| k.as_slice() == key)
            .map(|(_, v)| v)
    }

    /// Get a string value from a dictionary by key
    pub fn dict_get_str(&self, key: &[u8]) -> Option<&str> {
        self.dict_get(key)?.as_str()
    }

    /// Get an integer value from a dictionary by key
    pub fn dict_get_int(&self, key: &[u8]) -> Option<i64> {
        self.dict_get(key)?.as_integer()
    }

    /// Get a byte string value from a dictionary by key
    pub fn dict_get_bytes(&self, key: &[u8]) -> Option<&[u8]> {
        self.dict_get(key)?.as_bytes()
    }
}

/// JSON-style rendering used by the `decode` command. Byte strings that are
/// not valid UTF-8 are rendered lossily.
impl Serialize for BencodeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            BencodeValue::Integer(i) => serializer.serialize_i64(*i),
            BencodeValue::String(s) => serializer.serialize_str(&String::from_utf8_lossy(s)),
            BencodeValue::List(list) => {
                let mut seq = serializer.serialize_seq(Some(list.len()))?;
                for item in list {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            BencodeValue::Dict(dict) => {
                let mut map = serializer.serialize_map(Some(dict.len()))?;
                for (key, value) in dict {
                    map.serialize_entry(&String::from_utf8_lossy(key), value)?;
                }
                map.end()
            }
        }
    }
}
