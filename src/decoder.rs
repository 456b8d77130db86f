//! Input decoding
//!
//! The parser consumes UTF-32 codepoints. [`Utf8Decoder`] turns a byte
//! stream into codepoints and keeps incomplete sequences across chunk
//! boundaries, so a multi-byte character split between two reads is still
//! decoded once.

/// Replacement for undecodable input
pub const REPLACEMENT_CHAR: u32 = 0xFFFD;

/// Streaming UTF-8 decoder
#[derive(Debug, Clone, Default)]
pub struct Utf8Decoder {
    /// Bytes accumulated for current character
    buffer: [u8; 4],
    /// Number of bytes in buffer
    len: usize,
    /// Expected total bytes for current character
    expected: usize,
}

/// Result of feeding a byte to the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Utf8Result {
    /// Need more bytes
    Pending,
    /// A complete codepoint
    Codepoint(u32),
    /// Invalid sequence
    Invalid,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any partially received sequence
    pub fn reset(&mut self) {
        self.len = 0;
        self.expected = 0;
    }

    /// Whether a multi-byte sequence is incomplete
    pub fn is_pending(&self) -> bool {
        self.len > 0
    }

    /// Decode a chunk, appending codepoints to `out`
    ///
    /// Invalid sequences become U+FFFD. A byte that breaks a sequence is
    /// decoded again as the start of a new one.
    pub fn decode(&mut self, input: &[u8], out: &mut Vec<u32>) {
        out.reserve(input.len());
        for &byte in input {
            match self.feed(byte) {
                Utf8Result::Pending => {}
                Utf8Result::Codepoint(cp) => out.push(cp),
                Utf8Result::Invalid => {
                    out.push(REPLACEMENT_CHAR);
                    if byte >= 0xc0 || byte < 0x80 {
                        if let Utf8Result::Codepoint(cp) = self.feed(byte) {
                            out.push(cp);
                        }
                    }
                }
            }
        }
    }

    /// Feed a single byte
    pub fn feed(&mut self, byte: u8) -> Utf8Result {
        if self.len == 0 {
            if byte < 0x80 {
                return Utf8Result::Codepoint(byte as u32);
            }
            self.expected = match byte {
                0xc2..=0xdf => 2,
                0xe0..=0xef => 3,
                0xf0..=0xf4 => 4,
                _ => return Utf8Result::Invalid,
            };
            self.buffer[0] = byte;
            self.len = 1;
            return Utf8Result::Pending;
        }

        if byte & 0b1100_0000 != 0b1000_0000 {
            self.reset();
            return Utf8Result::Invalid;
        }

        self.buffer[self.len] = byte;
        self.len += 1;
        if self.len < self.expected {
            return Utf8Result::Pending;
        }

        let cp = match self.expected {
            2 => (self.buffer[0] as u32 & 0x1f) << 6 | (self.buffer[1] as u32 & 0x3f),
            3 => {
                (self.buffer[0] as u32 & 0x0f) << 12
                    | (self.buffer[1] as u32 & 0x3f) << 6
                    | (self.buffer[2] as u32 & 0x3f)
            }
            _ => {
                (self.buffer[0] as u32 & 0x07) << 18
                    | (self.buffer[1] as u32 & 0x3f) << 12
                    | (self.buffer[2] as u32 & 0x3f) << 6
                    | (self.buffer[3] as u32 & 0x3f)
            }
        };
        let min = match self.expected {
            2 => 0x80,
            3 => 0x800,
            _ => 0x10000,
        };
        self.reset();

        // overlong forms, surrogates and values past U+10FFFF
        if cp < min || (0xd800..=0xdfff).contains(&cp) || cp > 0x10ffff {
            Utf8Result::Invalid
        } else {
            Utf8Result::Codepoint(cp)
        }
    }
}

/// Convert a slice of codepoints into a `String`
///
/// Values that are not Unicode scalar values become U+FFFD.
pub fn utf32_to_string(data: &[u32]) -> String {
    data.iter()
        .map(|&cp| char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Convert a string into codepoints
pub fn string_to_utf32(s: &str) -> Vec<u32> {
    s.chars().map(|c| c as u32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]]) -> Vec<u32> {
        let mut decoder = Utf8Decoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            decoder.decode(chunk, &mut out);
        }
        out
    }

    #[test]
    fn test_ascii() {
        assert_eq!(decode_all(&[b"abc"]), vec![0x61, 0x62, 0x63]);
    }

    #[test]
    fn test_multibyte() {
        assert_eq!(decode_all(&["é€😀".as_bytes()]), vec![0xe9, 0x20ac, 0x1f600]);
    }

    #[test]
    fn test_split_across_chunks() {
        let bytes = "€".as_bytes();
        assert_eq!(decode_all(&[&bytes[..1], &bytes[1..2], &bytes[2..]]), vec![0x20ac]);
    }

    #[test]
    fn test_invalid_bytes() {
        assert_eq!(decode_all(&[&[0xff, b'a']]), vec![REPLACEMENT_CHAR, 0x61]);
        // truncated sequence followed by ascii keeps the ascii byte
        assert_eq!(decode_all(&[&[0xe2, 0x82, b'x']]), vec![REPLACEMENT_CHAR, 0x78]);
        // overlong encoding of '/'
        assert_eq!(decode_all(&[&[0xc0, 0xaf]]), vec![REPLACEMENT_CHAR, REPLACEMENT_CHAR]);
    }

    #[test]
    fn test_surrogate_rejected() {
        assert_eq!(decode_all(&[&[0xed, 0xa0, 0x80]]), vec![REPLACEMENT_CHAR]);
    }

    #[test]
    fn test_utf32_to_string() {
        assert_eq!(utf32_to_string(&[0x68, 0x69, 0x1f600]), "hi😀");
        assert_eq!(utf32_to_string(&[0xd800]), "\u{fffd}");
        assert_eq!(string_to_utf32("ab"), vec![0x61, 0x62]);
    }
}
