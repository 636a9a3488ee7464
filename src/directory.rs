use std::collections::HashSet;

use crate::bytes::*;
use crate::consts::*;
use crate::error::{IndexError, Result};
use crate::hashing::{depth_mask, prefix_at_depth};

/// Given the number of directory addresses derive the global depth
///
/// The address count is always a power of two, the depth is its log base 2.
fn addr_count_to_global_depth(length: usize) -> Option<u32> {
    if length.is_power_of_two() {
        Some(length.trailing_zeros())
    } else {
        None
    }
}

/// The two integers in front of the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub global_depth: u32,
    pub next_page_idx: u32,
}

impl FileHeader {
    /// An all zero header is what a file looks like before it was ever initialized
    pub fn is_blank(bytes: &[u8]) -> bool {
        bytes.iter().all(|b| *b == 0)
    }
}

impl ByteLength for FileHeader {
    fn byte_len(&self) -> usize {
        FILE_HEADER_SIZE
    }
}

impl IntoBytes for FileHeader {
    fn into_bytes(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FILE_HEADER_SIZE);
        bytes.extend((self.global_depth as i32).to_le_bytes());
        bytes.extend((self.next_page_idx as i32).to_le_bytes());
        bytes
    }
}

impl FromBytes for FileHeader {
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(FileHeader {
            global_depth: read_index_le(bytes, 0)?,
            next_page_idx: read_index_le(bytes, 4)?,
        })
    }
}

/// Pointers from hash prefixes to bucket pages
///
/// Always holds 2^global_depth entries. Entry `i` is the page for every key
/// whose low `global_depth` hash bits equal `i`, so the vector is ordered by
/// hash prefix:
///
/// 000 -> element 0
/// 001 -> element 1
/// 010 -> element 2
/// ... and so on
///
/// A bucket with local depth `d` is pointed to by every entry sharing its low
/// `d` bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    global_depth: u32,
    pages: Vec<u32>,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    /// Two entries pointing at pages 0 and 1
    pub fn new() -> Self {
        Self {
            global_depth: MIN_GLOBAL_DEPTH,
            pages: vec![0, 1],
        }
    }

    pub fn from_pages(pages: Vec<u32>) -> Result<Self> {
        let global_depth = addr_count_to_global_depth(pages.len())
            .filter(|depth| *depth >= MIN_GLOBAL_DEPTH)
            .ok_or_else(|| {
                IndexError::Corrupt(format!("directory of {} entries", pages.len()))
            })?;
        Ok(Self {
            global_depth,
            pages,
        })
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[u32] {
        &self.pages
    }

    pub fn slot_for(&self, hash: u64) -> usize {
        prefix_at_depth(hash, self.global_depth) as usize
    }

    pub fn page_for(&self, hash: u64) -> u32 {
        self.pages[self.slot_for(hash)]
    }

    pub fn page_at(&self, slot: usize) -> Option<u32> {
        self.pages.get(slot).copied()
    }

    pub fn first_slot_of(&self, page: u32) -> Option<usize> {
        self.pages.iter().position(|p| *p == page)
    }

    /// Appends a copy of the directory to itself
    pub fn double(&mut self) {
        self.pages.extend_from_within(..);
        self.global_depth += 1;
    }

    /// True when both halves are identical and the depth can still drop
    pub fn can_halve(&self) -> bool {
        if self.global_depth <= MIN_GLOBAL_DEPTH {
            return false;
        }
        let (low, high) = self.pages.split_at(self.pages.len() / 2);
        low == high
    }

    pub fn halve(&mut self) {
        let mid = self.pages.len() / 2;
        self.pages.truncate(mid);
        self.global_depth -= 1;
    }

    /// Moves the entries of `page` that have `bit` set over to `new_page`
    pub fn split_entries(&mut self, page: u32, new_page: u32, bit: usize) {
        for (slot, entry) in self.pages.iter_mut().enumerate() {
            if *entry == page && slot & bit != 0 {
                *entry = new_page;
            }
        }
    }

    pub fn repoint(&mut self, from: u32, to: u32) {
        for entry in self.pages.iter_mut().filter(|p| **p == from) {
            *entry = to;
        }
    }

    /// Each page once, in directory order
    pub fn distinct_pages(&self) -> Vec<u32> {
        let mut seen = HashSet::new();
        self.pages
            .iter()
            .copied()
            .filter(|page| seen.insert(*page))
            .collect()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.pages.len() * DIRECTORY_ENTRY_SIZE);
        for page in &self.pages {
            buf.extend((*page as i32).to_le_bytes());
        }
        buf
    }

    pub fn from_bytes(global_depth: u32, bytes: &[u8]) -> Result<Self> {
        let count = 1_usize << global_depth;
        if bytes.len() != count * DIRECTORY_ENTRY_SIZE {
            return Err(IndexError::Corrupt(format!(
                "directory needs {} bytes, found {}",
                count * DIRECTORY_ENTRY_SIZE,
                bytes.len()
            )));
        }
        let pages = (0..count)
            .map(|i| read_index_le(bytes, i * DIRECTORY_ENTRY_SIZE))
            .collect::<Result<Vec<_>>>()?;
        Self::from_pages(pages)
    }

    /// Checks the buddy invariant given each page's local depth
    ///
    /// Every entry sharing the low `local_depth` bits of a page's slot must
    /// point at that page, and no local depth may exceed the global depth.
    pub fn violations(&self, local_depth_of: impl Fn(u32) -> Option<u32>) -> Vec<String> {
        let mut violations = vec![];
        if self.pages.len() != 1 << self.global_depth {
            violations.push(format!(
                "directory has {} entries at global depth {}",
                self.pages.len(),
                self.global_depth
            ));
        }
        for (slot, page) in self.pages.iter().enumerate() {
            let Some(local_depth) = local_depth_of(*page) else {
                violations.push(format!("slot {slot} points at unknown page {page}"));
                continue;
            };
            if local_depth == 0 || local_depth > self.global_depth {
                violations.push(format!(
                    "page {page} has local depth {local_depth} at global depth {}",
                    self.global_depth
                ));
                continue;
            }
            let mask = depth_mask(local_depth) as usize;
            for (other, other_page) in self.pages.iter().enumerate() {
                let same_prefix = other & mask == slot & mask;
                if same_prefix != (other_page == page) {
                    violations.push(format!(
                        "slots {slot} and {other} disagree about page {page} at local depth {local_depth}"
                    ));
                    break;
                }
            }
        }
        violations
    }
}
