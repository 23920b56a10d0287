use core::ops::Range;

/// Size of a flash word in bytes. Program operations are done on whole words.
pub const WORD_SIZE: u32 = 4;

/// A byte range relative to the start of the medium
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Region {
    pub start: u32,
    pub length: u32,
}

impl Region {
    pub const fn new(start: u32, length: u32) -> Self {
        Self { start, length }
    }

    /// Exclusive end of the region, `None` if it overflows the address space
    pub fn end(&self) -> Option<u32> {
        self.start.checked_add(self.length)
    }

    /// Whether the region fits in a medium of `span` bytes
    pub fn fits(&self, span: u32) -> bool {
        matches!(self.end(), Some(end) if end <= span)
    }
}

/// A page id, pages are the smallest erasable unit of the medium
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Page(pub u16);

/// A byte request widened to whole words.
///
/// `word_address` is relative to the start of the medium, like the offset it was expanded from.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AlignedRequest {
    pub word_address: u32,
    pub word_count: u16,
    pub pre_skip: u8,
    pub length: u16,
}

impl AlignedRequest {
    /// Expand `length` bytes at `offset` to the smallest enclosing word range.
    pub const fn expand(offset: u32, length: u16) -> Self {
        let pre_skip = offset % WORD_SIZE;
        let raw = length as u32 + pre_skip;
        let span = (raw + WORD_SIZE - 1) / WORD_SIZE * WORD_SIZE;
        AlignedRequest {
            word_address: offset - pre_skip,
            word_count: (span / WORD_SIZE) as u16,
            pre_skip: pre_skip as u8,
            length,
        }
    }

    /// Number of bytes covered by the aligned words
    pub const fn byte_span(&self) -> usize {
        self.word_count as usize * WORD_SIZE as usize
    }

    /// Split the aligned span in pieces of at most `max_words` words.
    pub fn chunks(&self, max_words: usize) -> Chunks {
        debug_assert!(max_words > 0);
        Chunks {
            request: *self,
            max_words,
            next_word: 0,
        }
    }
}

/// One piece of an [`AlignedRequest`], see [`AlignedRequest::chunks`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Address of the first word, relative to the start of the medium
    pub word_address: u32,
    /// Number of words in this chunk
    pub word_count: usize,
    /// Bytes of the chunk that belong to the caller
    pub span: Range<usize>,
    /// The matching bytes in the caller's buffer
    pub data: Range<usize>,
}

impl Chunk {
    pub fn byte_len(&self) -> usize {
        self.word_count * WORD_SIZE as usize
    }

    /// Offset of the caller bytes in this chunk, only the first chunk has one
    pub fn pre_skip(&self) -> u8 {
        self.span.start as u8
    }

    /// Number of caller bytes in this chunk
    pub fn length(&self) -> u16 {
        self.span.len() as u16
    }
}

pub struct Chunks {
    request: AlignedRequest,
    max_words: usize,
    next_word: usize,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let total = self.request.word_count as usize;
        if self.next_word >= total {
            return None;
        }
        let word_count = self.max_words.min(total - self.next_word);
        let start = self.next_word * WORD_SIZE as usize;
        let end = start + word_count * WORD_SIZE as usize;
        self.next_word += word_count;

        // Caller bytes, relative to the aligned start
        let wanted_start = self.request.pre_skip as usize;
        let wanted_end = wanted_start + self.request.length as usize;
        let from = start.max(wanted_start);
        let to = end.min(wanted_end);

        Some(Chunk {
            word_address: self.request.word_address + start as u32,
            word_count,
            span: (from - start)..(to - start),
            data: (from - wanted_start)..(to - wanted_start),
        })
    }
}

/// The `length` caller bytes of an aligned buffer.
pub fn project(aligned: &[u8], pre_skip: u8, length: u16) -> &[u8] {
    let start = pre_skip as usize;
    &aligned[start..start + length as usize]
}

/// Unpack words to bytes, byte 0 in the least significant position.
pub fn words_to_bytes(words: &[u32], bytes: &mut [u8]) {
    for (word, out) in words.iter().zip(bytes.chunks_exact_mut(WORD_SIZE as usize)) {
        out.copy_from_slice(&word.to_le_bytes());
    }
}

/// Pack bytes to words, the inverse of [`words_to_bytes`].
pub fn bytes_to_words(bytes: &[u8], words: &mut [u32]) {
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(WORD_SIZE as usize)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_aligned() {
        let req = AlignedRequest::expand(0x100, 8);
        assert_eq!(req.word_address, 0x100);
        assert_eq!(req.word_count, 2);
        assert_eq!(req.pre_skip, 0);
    }

    #[test]
    fn expand_unaligned_start_and_end() {
        let req = AlignedRequest::expand(0x0FF9, 6);
        assert_eq!(req.word_address, 0x0FF8);
        assert_eq!(req.pre_skip, 1);
        // 1 + 6 = 7 bytes, rounded to 8
        assert_eq!(req.word_count, 2);
        assert!(req.word_address + req.word_count as u32 * 4 >= 0x0FF9 + 6);
    }

    #[test]
    fn expand_single_byte_keeps_invariants() {
        for offset in 0..12u32 {
            let req = AlignedRequest::expand(offset, 1);
            assert_eq!(req.word_address % WORD_SIZE, 0);
            assert_eq!(req.word_address + req.pre_skip as u32, offset);
            assert_eq!(req.word_count, 1);
        }
    }

    #[test]
    fn expand_maximum_length() {
        let req = AlignedRequest::expand(3, u16::MAX);
        assert_eq!(req.byte_span(), 65540);
        assert_eq!(req.word_count, 16385);
    }

    #[test]
    fn project_returns_caller_bytes() {
        let aligned = [0xFF, 0x01, 0x02, 0x03, 0x04, 0xFF, 0xFF, 0xFF];
        assert_eq!(project(&aligned, 1, 4), &[1, 2, 3, 4]);
    }

    #[test]
    fn single_chunk_covers_request() {
        let req = AlignedRequest::expand(2, 5);
        let chunks: Vec<Chunk> = req.chunks(64).collect();
        assert_eq!(chunks.len(), 1);
        let chunk = &chunks[0];
        assert_eq!(chunk.word_address, 0);
        assert_eq!(chunk.word_count, 2);
        assert_eq!(chunk.span, 2..7);
        assert_eq!(chunk.data, 0..5);
    }

    #[test]
    fn chunks_partition_caller_data() {
        let req = AlignedRequest::expand(0x1F3, 0x40);
        let chunks: Vec<Chunk> = req.chunks(4).collect();

        let mut expected_data = 0;
        let mut expected_word = req.word_address;
        for chunk in chunks.iter() {
            assert_eq!(chunk.word_address, expected_word);
            assert_eq!(chunk.data.start, expected_data);
            assert_eq!(chunk.span.len(), chunk.data.len());
            assert!(chunk.span.end <= chunk.byte_len());
            expected_data = chunk.data.end;
            expected_word += chunk.byte_len() as u32;
        }
        assert_eq!(expected_data, 0x40);
        assert_eq!(chunks[0].span.start, 3);
        assert_eq!(
            chunks.iter().map(|c| c.word_count).sum::<usize>(),
            req.word_count as usize
        );
    }

    #[test]
    fn word_packing_is_little_endian() {
        let mut words = [0u32; 2];
        bytes_to_words(&[0x01, 0x02, 0x03, 0x04, 0xA1, 0xB2, 0xC3, 0xD4], &mut words);
        assert_eq!(words, [0x0403_0201, 0xD4C3_B2A1]);

        let mut bytes = [0u8; 8];
        words_to_bytes(&words, &mut bytes);
        assert_eq!(bytes, [0x01, 0x02, 0x03, 0x04, 0xA1, 0xB2, 0xC3, 0xD4]);
    }

    #[test]
    fn region_fits() {
        assert!(Region::new(0, 0x1000).fits(0x1000));
        assert!(!Region::new(0x1000, 1).fits(0x1000));
        assert!(!Region::new(u32::MAX, 2).fits(u32::MAX));
    }
}
