use std::fmt::Display;

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("JSON output exceeded buffer")]
pub struct Overflow;

struct Frame {
    closer: u8,
    has_items: bool,
}

/// JSON writer over a fixed buffer that always leaves a parseable document.
///
/// Every write is a unit (separator, key, and a complete value or an opening
/// bracket) that is committed only if it fits together with the closing
/// brackets still owed and any bytes held by [`JsonWriter::reserve`]. The
/// first unit that doesn't fit puts the writer in overflow and everything
/// after it is dropped. [`JsonWriter::finish`] then writes whatever closers
/// are owed.
///
/// [`JsonWriter::atomic`] groups units into one record that is either
/// written whole or not at all.
pub struct JsonWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
    open: Vec<Frame>,
    reserved: usize,
    overflowed: bool,
    dropped: bool,
    unit: Vec<u8>,
}

struct Mark {
    len: usize,
    depth: usize,
    reserved: usize,
    parent_has_items: Option<bool>,
}

impl<'a> JsonWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            len: 0,
            open: Vec::new(),
            reserved: 0,
            overflowed: false,
            dropped: false,
            unit: Vec::new(),
        }
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// True once anything was left out, whether by overflow or by a
    /// rolled back [`JsonWriter::atomic`] group.
    pub fn truncated(&self) -> bool {
        self.overflowed || self.dropped
    }

    /// Runs `write` as one record. If any unit in it doesn't fit, the
    /// buffer is rolled back to where the record started and the writer
    /// stays usable, so the caller can still close what it has open.
    pub fn atomic(
        &mut self,
        write: impl FnOnce(&mut Self) -> Result<(), Overflow>,
    ) -> Result<(), Overflow> {
        if self.overflowed {
            return Err(Overflow);
        }
        let mark = Mark {
            len: self.len,
            depth: self.open.len(),
            reserved: self.reserved,
            parent_has_items: self.open.last().map(|f| f.has_items),
        };
        let res = write(self);
        if res.is_err() {
            self.len = mark.len;
            self.open.truncate(mark.depth);
            self.reserved = mark.reserved;
            if let (Some(parent), Some(has_items)) = (self.open.last_mut(), mark.parent_has_items) {
                parent.has_items = has_items;
            }
            self.overflowed = false;
            self.dropped = true;
        }
        res
    }

    /// Holds `n` bytes back from every later unit until [`JsonWriter::release`].
    pub fn reserve(&mut self, n: usize) -> Result<(), Overflow> {
        if self.overflowed {
            return Err(Overflow);
        }
        if self.len + self.reserved + n + self.open.len() > self.buf.len() {
            self.overflowed = true;
            return Err(Overflow);
        }
        self.reserved += n;
        Ok(())
    }

    pub fn release(&mut self, n: usize) {
        self.reserved = self.reserved.saturating_sub(n);
    }

    pub fn begin_object(&mut self, key: Option<&str>) -> Result<(), Overflow> {
        self.push_unit(key, |out| out.push(b'{'), Some(b'}'))
    }

    pub fn begin_array(&mut self, key: Option<&str>) -> Result<(), Overflow> {
        self.push_unit(key, |out| out.push(b'['), Some(b']'))
    }

    /// Closes the innermost object or array.
    pub fn end(&mut self) -> Result<(), Overflow> {
        if self.overflowed {
            return Err(Overflow);
        }
        if let Some(frame) = self.open.pop() {
            // reserved when the frame was opened
            self.buf[self.len] = frame.closer;
            self.len += 1;
        }
        Ok(())
    }

    /// String value, escaped, with at most `cap` bytes between the quotes.
    pub fn string(&mut self, key: Option<&str>, value: &str, cap: usize) -> Result<(), Overflow> {
        self.push_unit(
            key,
            |out| {
                out.push(b'"');
                escape_into(out, value, cap);
                out.push(b'"');
            },
            None,
        )
    }

    pub fn int(&mut self, key: Option<&str>, value: i64) -> Result<(), Overflow> {
        self.number(key, value)
    }

    /// `value` must be finite.
    pub fn float(&mut self, key: Option<&str>, value: f64, decimals: usize) -> Result<(), Overflow> {
        self.push_unit(
            key,
            |out| out.extend_from_slice(format!("{value:.decimals$}").as_bytes()),
            None,
        )
    }

    fn number(&mut self, key: Option<&str>, value: impl Display) -> Result<(), Overflow> {
        self.push_unit(key, |out| out.extend_from_slice(value.to_string().as_bytes()), None)
    }

    fn push_unit(
        &mut self,
        key: Option<&str>,
        body: impl FnOnce(&mut Vec<u8>),
        closer: Option<u8>,
    ) -> Result<(), Overflow> {
        if self.overflowed {
            return Err(Overflow);
        }

        self.unit.clear();
        if self.open.last().is_some_and(|f| f.has_items) {
            self.unit.push(b',');
        }
        if let Some(key) = key {
            self.unit.push(b'"');
            escape_into(&mut self.unit, key, usize::MAX);
            self.unit.extend_from_slice(b"\":");
        }
        body(&mut self.unit);

        let owed = self.open.len() + usize::from(closer.is_some()) + self.reserved;
        if self.len + self.unit.len() + owed > self.buf.len() {
            self.overflowed = true;
            return Err(Overflow);
        }
        self.buf[self.len..self.len + self.unit.len()].copy_from_slice(&self.unit);
        self.len += self.unit.len();

        if let Some(parent) = self.open.last_mut() {
            parent.has_items = true;
        }
        if let Some(closer) = closer {
            self.open.push(Frame {
                closer,
                has_items: false,
            });
        }
        Ok(())
    }

    /// Closes everything still open and returns the document length.
    pub fn finish(mut self) -> usize {
        while let Some(frame) = self.open.pop() {
            self.buf[self.len] = frame.closer;
            self.len += 1;
        }
        self.len
    }
}

/// Appends `s` to `out` with JSON string escaping, adding at most `cap`
/// bytes. Stops before an escape sequence or character that would cross
/// the cap.
pub fn escape_into(out: &mut Vec<u8>, s: &str, cap: usize) {
    let mut used = 0;
    let mut tmp = [0u8; 6];
    for c in s.chars() {
        let piece: &[u8] = match c {
            '"' => b"\\\"",
            '\\' => b"\\\\",
            '\n' => b"\\n",
            '\r' => b"\\r",
            '\t' => b"\\t",
            c if (c as u32) < 0x20 => {
                const HEX: &[u8; 16] = b"0123456789abcdef";
                let b = c as u8;
                tmp = [b'\\', b'u', b'0', b'0', HEX[(b >> 4) as usize], HEX[(b & 0xF) as usize]];
                &tmp
            }
            c => c.encode_utf8(&mut tmp).as_bytes(),
        };
        if used + piece.len() > cap {
            break;
        }
        out.extend_from_slice(piece);
        used += piece.len();
    }
}
