use serde_json::{Deserializer, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Sync,
    Ack,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parse {
    /// The request and how many leading bytes it used. Anything after that
    /// belongs to the next message.
    Complete(Request, usize),
    /// valid JSON so far, wait for more bytes
    Incomplete,
}

/// Classifies what a client has sent so far.
///
/// JSON objects are matched on `"action": "sync"` or an `ack` key. Only the
/// first value is read, so a client that writes two messages back to back
/// leaves the second in the buffer. Anything that isn't JSON falls back to
/// looking for the quoted tokens, the way older clients were matched, and
/// uses the whole buffer.
pub fn classify(bytes: &[u8]) -> Parse {
    let mut values = Deserializer::from_slice(bytes).into_iter::<Value>();
    match values.next() {
        Some(Ok(value)) => {
            let used = values.byte_offset();
            if next_is_message(&bytes[used..]) {
                Parse::Complete(classify_value(&value), used)
            } else {
                Parse::Complete(match_tokens(bytes), bytes.len())
            }
        }
        Some(Err(e)) if e.is_eof() => Parse::Incomplete,
        None => Parse::Incomplete,
        Some(Err(_)) => Parse::Complete(match_tokens(bytes), bytes.len()),
    }
}

/// For a buffer that can't grow any more, so there is nothing to wait for.
pub fn classify_final(bytes: &[u8]) -> Request {
    match classify(bytes) {
        Parse::Complete(req, _) => req,
        Parse::Incomplete => match_tokens(bytes),
    }
}

fn classify_value(value: &Value) -> Request {
    let Value::Object(map) = value else {
        return Request::Unknown;
    };
    if map.get("action").and_then(Value::as_str) == Some("sync") {
        Request::Sync
    } else if map.contains_key("ack") {
        Request::Ack
    } else {
        Request::Unknown
    }
}

fn next_is_message(rest: &[u8]) -> bool {
    rest.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_none_or(|&b| b == b'{')
}

fn match_tokens(bytes: &[u8]) -> Request {
    let contains = |needle: &[u8]| bytes.windows(needle.len()).any(|w| w == needle);
    if contains(b"\"action\"") && contains(b"\"sync\"") {
        Request::Sync
    } else if contains(b"\"ack\"") {
        Request::Ack
    } else {
        Request::Unknown
    }
}
