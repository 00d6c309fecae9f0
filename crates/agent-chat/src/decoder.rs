/// Splits a chunked response body into newline-delimited records.
///
/// Bytes after the last newline stay buffered until a later chunk completes
/// them. Buffering raw bytes keeps multi-byte UTF-8 sequences intact across
/// chunk boundaries; each complete record is decoded lossily.
///
/// The carried fragment has no size limit: a producer that never sends a
/// newline keeps growing it until the body ends.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    buf: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every record it completed, in order.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        // The carried fragment never holds a newline, so only the new bytes
        // need scanning.
        let Some(offset) = chunk.iter().rposition(|b| *b == b'\n') else {
            self.buf.extend_from_slice(chunk);
            return Vec::new();
        };
        let last_newline = self.buf.len() + offset;
        self.buf.extend_from_slice(chunk);

        let complete: Vec<u8> = self.buf.drain(..=last_newline).collect();
        complete[..complete.len() - 1]
            .split(|b| *b == b'\n')
            .map(decode_record)
            .collect()
    }

    /// Bytes received but not yet terminated by a newline.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Ends the stream and returns the unterminated trailing fragment, if any.
    ///
    /// The fragment is never parsed as a record.
    pub fn finish(self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(decode_record(&self.buf))
        }
    }
}

fn decode_record(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_suffix('\r').unwrap_or(&text).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_partial_record_to_next_chunk() {
        let mut decoder = ChunkDecoder::new();
        let first = decoder.push_chunk(b"data: {\"type\":\"content\",\"content\":\"hel");
        assert!(first.is_empty());
        let second = decoder.push_chunk(b"lo\"}\n\n");
        assert_eq!(
            second,
            vec![
                "data: {\"type\":\"content\",\"content\":\"hello\"}".to_string(),
                String::new(),
            ]
        );
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn multiple_records_in_one_chunk_keep_order() {
        let mut decoder = ChunkDecoder::new();
        let records = decoder.push_chunk(b"a\nb\r\nc");
        assert_eq!(records, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(decoder.pending(), b"c");
    }

    #[test]
    fn split_multibyte_character_is_reassembled() {
        let text = "data: ü\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xC3).expect("lead byte") + 1;
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.push_chunk(&text[..split]).is_empty());
        assert_eq!(decoder.push_chunk(&text[split..]), vec!["data: ü".to_string()]);
    }

    #[test]
    fn invalid_bytes_degrade_to_replacement_characters() {
        let mut decoder = ChunkDecoder::new();
        let records = decoder.push_chunk(b"data: \xFF\n");
        assert_eq!(records, vec!["data: \u{FFFD}".to_string()]);
    }

    #[test]
    fn long_record_spanning_many_chunks() {
        let mut decoder = ChunkDecoder::new();
        for _ in 0..100 {
            assert!(decoder.push_chunk(b"xxxxxxxxxx").is_empty());
        }
        assert_eq!(decoder.pending().len(), 1000);
        let records = decoder.push_chunk(b"x\nnext");
        assert_eq!(records, vec!["x".repeat(1001)]);
        assert_eq!(decoder.pending(), b"next");
    }

    #[test]
    fn finish_returns_unterminated_tail() {
        let mut decoder = ChunkDecoder::new();
        decoder.push_chunk(b"done\ntail");
        assert_eq!(decoder.finish().as_deref(), Some("tail"));

        let empty = ChunkDecoder::new();
        assert_eq!(empty.finish(), None);
    }
}
