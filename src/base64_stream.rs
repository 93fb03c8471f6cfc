//! Incremental base64 decoding for chunked `IO.read` payloads.
//!
//! Chromium returns `Page.printToPDF` stream data as a sequence of base64
//! text chunks delivered one `IO.read` response at a time. [`StreamDecoder`]
//! turns that sequence back into the binary PDF bytes without ever holding
//! more than three undecoded bytes in memory, and without assuming chunk
//! boundaries line up with 4-byte base64 groups.

use crate::error::{CdpError, CdpResult};

#[inline]
fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

#[inline]
fn decode_sextet(b: u8) -> Option<u8> {
    match b {
        b'A'..=b'Z' => Some(b - b'A'),
        b'a'..=b'z' => Some(b - b'a' + 26),
        b'0'..=b'9' => Some(b - b'0' + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

/// Stateful base64 decoder that tolerates whitespace and arbitrary chunk
/// boundaries across repeated [`push`](StreamDecoder::push) calls.
///
/// The concatenation of every `push` output equals the single-shot decode of
/// the concatenation of inputs, for any partitioning of the input text into
/// chunks.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    /// Up to 3 leftover input bytes (after whitespace is stripped) that did
    /// not yet complete a 4-byte group.
    pending: [u8; 4],
    pending_len: u8,
    /// Set once `=` padding has been observed; any subsequent non-whitespace
    /// byte is an error.
    finished: bool,
}

impl StreamDecoder {
    /// Creates a fresh decoder with no buffered state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `chunk`, appending any whole bytes produced to `out` and
    /// returning the number of bytes appended.
    ///
    /// Whitespace (space, tab, LF, VT, FF, CR) is skipped anywhere in the
    /// input. Bytes that don't complete a 4-byte group are retained
    /// internally and combined with the next call.
    pub fn push(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> CdpResult<usize> {
        let start_len = out.len();
        for &b in chunk {
            if is_whitespace(b) {
                continue;
            }
            if b == b'=' {
                self.finished = true;
                continue;
            }
            if self.finished {
                return Err(CdpError::Decode(
                    "non-whitespace byte after padding".to_string(),
                ));
            }
            let sextet =
                decode_sextet(b).ok_or_else(|| CdpError::Decode(format!("invalid byte {b:#x}")))?;
            self.pending[self.pending_len as usize] = sextet;
            self.pending_len += 1;
            if self.pending_len == 4 {
                let group = self.pending;
                out.push((group[0] << 2) | (group[1] >> 4));
                out.push((group[1] << 4) | (group[2] >> 2));
                out.push((group[2] << 6) | group[3]);
                self.pending_len = 0;
            }
        }
        Ok(out.len() - start_len)
    }

    /// Decodes `chunk` and returns the produced bytes as a fresh `Vec`.
    pub fn push_owned(&mut self, chunk: &[u8]) -> CdpResult<Vec<u8>> {
        let mut out = Vec::with_capacity(chunk.len() / 4 * 3 + 3);
        self.push(chunk, &mut out)?;
        Ok(out)
    }

    /// Discards any buffered remainder. Called after disposing a stream
    /// handle so the decoder can be reused for the next render.
    pub fn reset(&mut self) {
        self.pending_len = 0;
        self.finished = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]]) -> Vec<u8> {
        let mut dec = StreamDecoder::new();
        let mut out = Vec::new();
        for c in chunks {
            dec.push(c, &mut out).unwrap();
        }
        out
    }

    #[test]
    fn single_shot_matches_reference() {
        let text = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            b"the quick brown fox jumps over the lazy dog",
        );
        let got = decode_all(&[text.as_bytes()]);
        assert_eq!(got, b"the quick brown fox jumps over the lazy dog");
    }

    #[test]
    fn chunk_boundaries_within_a_group_roundtrip() {
        let input = b"hello world, this is a longer payload to chunk awkwardly";
        let text = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, input);
        let bytes = text.as_bytes();

        // split at every possible single boundary and check the concatenation
        // always equals the single-shot decode.
        let whole = decode_all(&[bytes]);
        for split in 1..bytes.len() {
            let (a, b) = bytes.split_at(split);
            let got = decode_all(&[a, b]);
            assert_eq!(got, whole, "split at {split} diverged");
        }
    }

    #[test]
    fn whitespace_is_tolerated_and_produces_no_spurious_bytes() {
        let mut dec = StreamDecoder::new();
        let mut out = Vec::new();
        let n = dec.push(b"   \t\r\n  ", &mut out).unwrap();
        assert_eq!(n, 0);
        assert!(out.is_empty());

        let text = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b"abc");
        let spaced: String = text
            .bytes()
            .enumerate()
            .map(|(i, b)| if i % 2 == 0 { format!(" {}", b as char) } else { (b as char).to_string() })
            .collect();
        out.clear();
        dec.push(spaced.as_bytes(), &mut out).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn malformed_input_fails_fast() {
        let mut dec = StreamDecoder::new();
        let mut out = Vec::new();
        let err = dec.push(b"not!valid$$", &mut out);
        assert!(err.is_err());
    }

    #[test]
    fn reset_discards_buffered_remainder() {
        let mut dec = StreamDecoder::new();
        let mut out = Vec::new();
        // "QQ" decodes to a single pending sextet pair, not a full group.
        dec.push(b"QQ", &mut out).unwrap();
        assert!(out.is_empty());
        dec.reset();
        // If the remainder wasn't discarded this would combine with "QQ" and
        // decode successfully instead of failing on a fresh, unrelated chunk.
        out.clear();
        dec.push(b"====", &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn per_chunk_output_is_bounded_by_four_to_three() {
        let mut dec = StreamDecoder::new();
        let mut out = Vec::new();
        // 8 valid base64 chars -> at most 6 bytes.
        let n = dec.push(b"QUJDRA==", &mut out).unwrap();
        assert!(n <= 6);
        assert_eq!(out, b"ABCD");
    }
}
