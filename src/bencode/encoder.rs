use super::BencodeValue;

/// Encode a BencodeValue into its byte representation.
///
/// Dictionaries are written in their stored order, so `encode(decode(raw))`
/// reproduces `raw` for any input this encoder produced.
pub fn encode(value: &BencodeValue) -> Vec<u8> {
    let mut result = Vec::new();
    encode_into(value, &mut result);
    result
}

fn encode_bytes(bytes: &[u8], output: &mut Vec<u8>) {
    output.extend_from_slice(bytes.len().to_string().as_bytes());
    output.push(b':');
    output.extend_from_slice(bytes);
}

fn encode_into(value: &BencodeValue, output: &mut Vec<u8>) {
    match value {
        BencodeValue::Integer(i) => {
            output.push(b'i');
            output.extend_from_slice(i.to_string().as_bytes());
            output.push(b'e');
        }
        BencodeValue::String(s) => encode_bytes(s, output),
        BencodeValue::List(list) => {
            output.push(b'l');
            for item in list {
                encode_into(item, output);
            }
            output.push(b'e');
        }
        BencodeValue::Dict(dict) => {
            output.push(b'd');
            for (key, value) in dict {
                encode_bytes(key, output);
                encode_into(value, output);
            }
            output.push(b'e');
        }
    }
}
