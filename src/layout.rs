use crate::consts::*;

/// Byte offsets of everything in an index file
///
/// ## File layout
/// - u32 length of the schema blob, followed by the blob
/// - Header: global depth, next free page index
/// - Directory: 2^global_depth page indices
/// - Pages, each a bucket header followed by `capacity` record slots
///
/// Every offset past the header depends on the global depth, so callers pass
/// the depth of the directory currently on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    blob_len: u64,
    record_size: usize,
    capacity: usize,
}

impl PageLayout {
    pub fn new(blob_len: u64, record_size: usize, capacity: usize) -> Self {
        Self {
            blob_len,
            record_size,
            capacity,
        }
    }

    pub fn header_offset(&self) -> u64 {
        SCHEMA_LEN_PREFIX as u64 + self.blob_len
    }

    pub fn directory_offset(&self) -> u64 {
        self.header_offset() + FILE_HEADER_SIZE as u64
    }

    pub fn directory_len_bytes(global_depth: u32) -> usize {
        (1_usize << global_depth) * DIRECTORY_ENTRY_SIZE
    }

    pub fn pages_base(&self, global_depth: u32) -> u64 {
        self.directory_offset() + Self::directory_len_bytes(global_depth) as u64
    }

    /// Bytes of record slots in one page
    pub fn slots_size(&self) -> usize {
        self.capacity * self.record_size
    }

    pub fn page_size(&self) -> usize {
        BUCKET_HEADER_SIZE + self.slots_size()
    }

    pub fn page_offset(&self, global_depth: u32, page_idx: u32) -> u64 {
        self.pages_base(global_depth) + page_idx as u64 * self.page_size() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_the_file_layout() {
        let layout = PageLayout::new(10, 9, 3);
        assert_eq!(layout.header_offset(), 14);
        assert_eq!(layout.directory_offset(), 22);
        assert_eq!(layout.pages_base(1), 30);
        assert_eq!(layout.page_size(), 8 + 27);
        assert_eq!(layout.page_offset(1, 0), 30);
        assert_eq!(layout.page_offset(1, 2), 30 + 70);
    }

    #[test]
    fn doubling_the_directory_shifts_every_page() {
        let layout = PageLayout::new(0, 9, 3);
        let shift = layout.page_offset(3, 5) - layout.page_offset(2, 5);
        assert_eq!(shift, 16);
    }
}
