/// Extendible hashing storage
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::bucket::Bucket;
use crate::bytes::*;
use crate::config::{CorruptionPolicy, IndexOptions};
use crate::consts::*;
use crate::directory::{Directory, FileHeader};
use crate::error::{IndexError, Result};
use crate::hashing::{depth_mask, hash_key, prefix_at_depth};
use crate::layout::PageLayout;
use crate::record::{Fields, Record, Value};
use crate::schema::{read_schema_blob, write_schema, RecordLayout, Schema};

/// Counters and shape of an index at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub global_depth: u32,
    pub directory_len: usize,
    pub next_page_idx: u32,
    pub distinct_buckets: usize,
    pub records: usize,
    pub reads: u64,
    pub writes: u64,
}

/// Result of walking the whole structure and checking its invariants
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub violations: Vec<String>,
    pub buckets: usize,
    pub records: usize,
    pub longest_chain: usize,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Hash storage engine
///
/// Everything lives in a single file, see [PageLayout] for the byte layout.
/// The directory and header are held in memory and written back whenever
/// they change. Buckets are never cached, every bucket access opens the
/// file, seeks, and closes it again.
///
/// Pages are handed out from `next_page_idx` and never reused. Pages emptied
/// by a split or merge stay allocated but unreferenced.
pub struct HashStorage {
    path: PathBuf,

    schema: Schema,

    /// Binary layout of one record slot, derived from the schema
    record_layout: RecordLayout,

    layout: PageLayout,

    options: IndexOptions,

    /// Together with its global depth this is the addressing table of the
    /// index, loaded from and saved to the directory region of the file
    directory: Directory,

    /// The page the next allocation gets
    next_page_idx: u32,

    read_count: u64,

    write_count: u64,
}

impl HashStorage {
    /// Creates a new index file, replacing whatever was at `path`
    pub fn create(path: impl AsRef<Path>, schema: &Schema, options: IndexOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        Self::check_options(schema, &options)?;
        let blob_len = write_schema(&path, schema, &options.shape())?;
        info!("created hash index at {}", path.display());

        let mut storage = Self::assemble(path, schema.clone(), blob_len, options);
        storage.init_structure()?;
        Ok(storage)
    }

    /// Opens an existing index file, taking the schema from the file itself
    ///
    /// The options the file was created with (see [IndexShape]) replace the
    /// ones passed in, only the corruption policy is up to the caller.
    /// A missing or blank header is not an error, the structure is initialized
    /// from scratch. A header that can't be trusted is handled according to
    /// [IndexOptions::on_corrupt].
    ///
    /// [IndexShape]: crate::config::IndexShape
    pub fn open(path: impl AsRef<Path>, options: IndexOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let blob =
            read_schema_blob(&path)?.ok_or_else(|| IndexError::MissingSchema(path.clone()))?;
        let options = match blob.shape {
            Some(stored) if stored != options.shape() => {
                warn!(
                    "{} was created with {:?}, ignoring {:?}",
                    path.display(),
                    stored,
                    options.shape()
                );
                options.with_shape(stored)
            }
            _ => options,
        };
        Self::check_options(&blob.schema, &options)?;

        let mut storage = Self::assemble(path, blob.schema, blob.len, options);
        storage.load_or_init()?;
        Ok(storage)
    }

    /// Opens the file if it already carries a schema, creates it otherwise
    pub fn open_or_create(
        path: impl AsRef<Path>,
        schema: &Schema,
        options: IndexOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        match read_schema_blob(path)? {
            Some(stored) => {
                if &stored.schema != schema {
                    warn!(
                        "{} already has a different schema, keeping the stored one",
                        path.display()
                    );
                }
                Self::open(path, options)
            }
            None => Self::create(path, schema, options),
        }
    }

    fn check_options(schema: &Schema, options: &IndexOptions) -> Result<()> {
        options.validate()?;
        if schema.field(&options.key_field).is_none() {
            return Err(IndexError::Config(format!(
                "key field {} is not in the schema",
                options.key_field
            )));
        }
        Ok(())
    }

    fn assemble(path: PathBuf, schema: Schema, blob_len: u64, options: IndexOptions) -> Self {
        let record_layout = schema.layout();
        let layout = PageLayout::new(
            blob_len,
            record_layout.record_size,
            options.bucket_capacity,
        );
        Self {
            path,
            schema,
            record_layout,
            layout,
            options,
            directory: Directory::new(),
            next_page_idx: 2,
            read_count: 0,
            write_count: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    pub fn key_field(&self) -> &str {
        &self.options.key_field
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn global_depth(&self) -> u32 {
        self.directory.global_depth()
    }

    pub fn next_page_idx(&self) -> u32 {
        self.next_page_idx
    }

    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// Chains may grow one bucket longer for every level of global depth
    pub fn max_chain_len(&self) -> usize {
        self.options.initial_max_chain + self.directory.global_depth() as usize
    }

    /// All live records whose key field equals `key`
    pub fn find(&mut self, key: &Value) -> Result<Vec<Fields>> {
        let key = self.conform_key(key);
        let page = self.directory.page_for(self.hash(&key));
        let chain = self.read_chain(page)?;
        let key_field = &self.options.key_field;
        Ok(chain
            .iter()
            .flat_map(|(_, bucket)| bucket.find(&key, key_field))
            .map(|r| r.fields.clone())
            .collect())
    }

    /// Stores a record, there is no duplicate key check
    ///
    /// Returns the fields as stored, integers given for float fields come back
    /// as floats.
    pub fn insert(&mut self, fields: Fields) -> Result<Fields> {
        let fields = self.conform(fields);
        let record = Record::from_fields(fields.clone())?;
        let key = record
            .key(&self.options.key_field)
            .cloned()
            .ok_or_else(|| {
                IndexError::Schema(format!("record has no {} field", self.options.key_field))
            })?;
        // Reject records that can't be stored before the structure changes shape
        record.encode(&self.record_layout)?;
        let hash = self.hash(&key);

        loop {
            let page = self.directory.page_for(hash);
            let mut chain = self.read_chain(page)?;
            let has_room = chain.iter().any(|(_, b)| !b.is_full());
            let below_ceiling = chain.len() < self.max_chain_len();
            let at_depth_limit = chain[0].1.local_depth >= self.options.max_global_depth;

            if has_room || below_ceiling || at_depth_limit {
                if !has_room && !below_ceiling {
                    warn!(
                        "page {} is at the depth limit {}, extending its chain past {} buckets",
                        page,
                        self.options.max_global_depth,
                        chain.len()
                    );
                }
                let touched = self.append_to_chain(&mut chain, record)?;
                for i in touched {
                    let (p, bucket) = &chain[i];
                    self.write_bucket(*p, bucket)?;
                }
                return Ok(fields);
            }

            // The directory changed shape, address the key again
            self.split(page)?;
        }
    }

    /// Removes every record whose key field equals `key`
    ///
    /// Returns `None` when nothing matched.
    pub fn remove(&mut self, key: &Value) -> Result<Option<Vec<Fields>>> {
        let key = self.conform_key(key);
        let page = self.directory.page_for(self.hash(&key));
        let mut chain = self.read_chain(page)?;

        let mut removed = vec![];
        for (p, bucket) in chain.iter_mut() {
            if let Some(records) = bucket.remove(&key, &self.options.key_field) {
                self.write_bucket(*p, bucket)?;
                removed.extend(records.into_iter().map(|r| r.fields));
            }
        }

        if removed.is_empty() {
            return Ok(None);
        }

        let head = &chain[0].1;
        if head.is_empty() && head.local_depth > MIN_GLOBAL_DEPTH {
            self.try_merge(page)?;
        }
        Ok(Some(removed))
    }

    /// Every live record, each exactly once
    pub fn all_records(&mut self) -> Result<Vec<Fields>> {
        let mut seen = HashSet::new();
        let mut result = vec![];
        for page in self.directory.distinct_pages() {
            for (p, bucket) in self.read_chain(page)? {
                if !seen.insert(p) {
                    continue;
                }
                result.extend(
                    bucket
                        .records
                        .into_iter()
                        .filter(|r| !r.deleted)
                        .map(|r| r.fields),
                );
            }
        }
        Ok(result)
    }

    pub fn stats(&mut self) -> Result<IndexStats> {
        let records = self.all_records()?.len();
        Ok(IndexStats {
            global_depth: self.directory.global_depth(),
            directory_len: self.directory.len(),
            next_page_idx: self.next_page_idx,
            distinct_buckets: self.directory.distinct_pages().len(),
            records,
            reads: self.read_count,
            writes: self.write_count,
        })
    }

    /// Walks every chain and checks the structural invariants
    pub fn verify(&mut self) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        let mut depths = HashMap::new();
        let max_chain_len = self.max_chain_len();

        for page in self.directory.distinct_pages() {
            if page >= self.next_page_idx {
                report
                    .violations
                    .push(format!("directory points at unallocated page {page}"));
                continue;
            }
            let chain = match self.read_chain(page) {
                Ok(chain) => chain,
                Err(IndexError::Corrupt(reason)) => {
                    report.violations.push(format!("page {page}: {reason}"));
                    continue;
                }
                Err(e) => return Err(e),
            };

            let head_depth = chain[0].1.local_depth;
            depths.insert(page, head_depth);
            report.buckets += 1;
            report.longest_chain = report.longest_chain.max(chain.len());
            report.records += chain.iter().map(|(_, b)| b.records.len()).sum::<usize>();

            if chain.len() > max_chain_len && head_depth < self.options.max_global_depth {
                report.violations.push(format!(
                    "chain at page {page} has {} buckets, limit is {max_chain_len}",
                    chain.len()
                ));
            }
        }

        report
            .violations
            .extend(self.directory.violations(|p| depths.get(&p).copied()));
        Ok(report)
    }

    fn hash(&self, key: &Value) -> u64 {
        hash_key(key, self.options.hash)
    }

    /// Brings values to the type their schema field stores
    fn conform(&self, fields: Fields) -> Fields {
        fields
            .into_iter()
            .map(|(name, value)| {
                let value = match self.schema.field(&name) {
                    Some(def) => value.coerce_to(def.ty),
                    None => value,
                };
                (name, value)
            })
            .collect()
    }

    fn conform_key(&self, key: &Value) -> Value {
        match self.schema.field(&self.options.key_field) {
            Some(def) => key.clone().coerce_to(def.ty),
            None => key.clone(),
        }
    }

    fn key_of<'a>(&self, record: &'a Record) -> Result<&'a Value> {
        record.key(&self.options.key_field).ok_or_else(|| {
            IndexError::Corrupt(format!("stored record without {}", self.options.key_field))
        })
    }

    fn allocate_page(&mut self) -> u32 {
        let page = self.next_page_idx;
        self.next_page_idx += 1;
        page
    }

    /// Puts the record in the first bucket of the chain with room, growing the
    /// chain by a fresh page if every bucket is full
    ///
    /// Returns the positions in the chain that changed and need saving.
    fn append_to_chain(
        &mut self,
        chain: &mut Vec<(u32, Bucket)>,
        record: Record,
    ) -> Result<Vec<usize>> {
        let mut record = record;
        for (i, (_, bucket)) in chain.iter_mut().enumerate() {
            match bucket.put(record) {
                Ok(()) => return Ok(vec![i]),
                Err(back) => record = back,
            }
        }

        let new_page = self.allocate_page();
        let tail = chain.len() - 1;
        let local_depth = chain[tail].1.local_depth;
        chain[tail].1.overflow_page = Some(new_page);

        let mut bucket = Bucket::new(local_depth, self.options.bucket_capacity);
        bucket.records.push(record);
        chain.push((new_page, bucket));
        debug!("extended chain with overflow page {}", new_page);

        // next_page_idx moved
        self.write_directory()?;
        Ok(vec![tail, tail + 1])
    }

    /// Splits the bucket at `page`, doubling the directory first when the
    /// bucket already uses every bit of it
    fn split(&mut self, page: u32) -> Result<()> {
        let chain = self.read_chain(page)?;
        let old_depth = chain[0].1.local_depth;
        if old_depth >= self.directory.global_depth() {
            self.grow_directory()?;
        }

        let new_depth = old_depth + 1;
        let new_page = self.allocate_page();
        let bit = 1_usize << old_depth;
        self.directory.split_entries(page, new_page, bit);
        self.write_directory()?;

        let capacity = self.options.bucket_capacity;
        let mut records = vec![];
        let mut emptied = vec![];
        for (p, bucket) in chain {
            records.extend(bucket.records);
            if p != page {
                emptied.push(p);
            }
        }
        for p in emptied {
            self.write_bucket(p, &Bucket::new(new_depth, capacity))?;
        }

        let mut low = vec![(page, Bucket::new(new_depth, capacity))];
        let mut high = vec![(new_page, Bucket::new(new_depth, capacity))];
        let moved = records.len();
        for record in records {
            let prefix = prefix_at_depth(self.hash(self.key_of(&record)?), new_depth) as usize;
            let target = if prefix & bit == 0 { &mut low } else { &mut high };
            self.append_to_chain(target, record)?;
        }
        for (p, bucket) in low.iter().chain(high.iter()) {
            self.write_bucket(*p, bucket)?;
        }

        debug!(
            "split page {} into {} at local depth {}, redistributed {} records",
            page, new_page, new_depth, moved
        );
        Ok(())
    }

    /// Folds the emptied bucket at `page` into its buddy
    ///
    /// The bucket's prefix comes from a directory slot that points at it, the
    /// buddy is whatever the slot with the top bit of that prefix flipped
    /// points at. Only happens when the buddy has the same local depth and all
    /// of its records fit in one bucket. Returns whether a merge happened.
    fn try_merge(&mut self, page: u32) -> Result<bool> {
        let chain = self.read_chain(page)?;
        let local_depth = chain[0].1.local_depth;
        if local_depth <= MIN_GLOBAL_DEPTH || chain.iter().any(|(_, b)| !b.is_empty()) {
            return Ok(false);
        }

        let Some(slot) = self.directory.first_slot_of(page) else {
            return Ok(false);
        };
        let prefix = slot & depth_mask(local_depth) as usize;
        let buddy_slot = prefix ^ (1 << (local_depth - 1));
        let buddy_page = match self.directory.page_at(buddy_slot) {
            Some(p) if p != page => p,
            _ => return Ok(false),
        };

        let buddy_chain = self.read_chain(buddy_page)?;
        if buddy_chain[0].1.local_depth != local_depth {
            return Ok(false);
        }
        let live: usize = buddy_chain.iter().map(|(_, b)| b.records.len()).sum();
        if live > self.options.bucket_capacity {
            return Ok(false);
        }

        let capacity = self.options.bucket_capacity;
        let mut merged = Bucket::new(local_depth - 1, capacity);
        for (p, bucket) in buddy_chain {
            merged.records.extend(bucket.records);
            if p != buddy_page {
                self.write_bucket(p, &Bucket::new(local_depth - 1, capacity))?;
            }
        }
        self.write_bucket(buddy_page, &merged)?;

        self.directory.repoint(page, buddy_page);
        debug!(
            "merged page {} into buddy {} at local depth {}",
            page,
            buddy_page,
            local_depth - 1
        );

        if self.directory.can_halve() && self.chains_fit(self.max_chain_len() - 1)? {
            self.shrink_directory()?;
        } else {
            self.write_directory()?;
        }
        Ok(true)
    }

    /// Whether every chain is at most `limit` buckets long, halving the
    /// directory lowers the ceiling by one
    fn chains_fit(&mut self, limit: usize) -> Result<bool> {
        for page in self.directory.distinct_pages() {
            if self.read_chain(page)?.len() > limit {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Doubles the directory. The page region sits right after the directory,
    /// so every page moves along with it.
    fn grow_directory(&mut self) -> Result<()> {
        let old_depth = self.directory.global_depth();
        let pages = self.read_page_region(old_depth)?;
        self.directory.double();
        self.write_page_region(&pages)?;
        self.write_directory()?;
        debug!(
            "doubled directory to {} entries at global depth {}",
            self.directory.len(),
            self.directory.global_depth()
        );
        Ok(())
    }

    fn shrink_directory(&mut self) -> Result<()> {
        let old_depth = self.directory.global_depth();
        let pages = self.read_page_region(old_depth)?;
        self.directory.halve();
        self.write_directory()?;
        self.write_page_region(&pages)?;

        let end = self
            .layout
            .page_offset(self.directory.global_depth(), self.next_page_idx);
        self.open_file()?.set_len(end)?;
        debug!(
            "halved directory to {} entries at global depth {}",
            self.directory.len(),
            self.directory.global_depth()
        );
        Ok(())
    }

    fn read_page_region(&mut self, global_depth: u32) -> Result<Vec<u8>> {
        let start = self.layout.pages_base(global_depth);
        let len = self.next_page_idx as usize * self.layout.page_size();
        let bytes = self.read_up_to(start, len)?;
        self.read_count += 1;
        Ok(bytes)
    }

    fn write_page_region(&mut self, bytes: &[u8]) -> Result<()> {
        let start = self.layout.pages_base(self.directory.global_depth());
        self.write_at(start, bytes)?;
        self.write_count += 1;
        Ok(())
    }

    fn load_or_init(&mut self) -> Result<()> {
        let header = self.read_up_to(self.layout.header_offset(), FILE_HEADER_SIZE)?;
        if header.len() < FILE_HEADER_SIZE || FileHeader::is_blank(&header) {
            debug!("no header in {}, initializing", self.path.display());
            return self.init_structure();
        }
        self.read_count += 1;

        match self.parse_structure(&header) {
            Ok((directory, next_page_idx)) => {
                self.directory = directory;
                self.next_page_idx = next_page_idx;
                Ok(())
            }
            Err(e) => match self.options.on_corrupt {
                CorruptionPolicy::Fail => Err(e),
                CorruptionPolicy::Reinitialize => {
                    warn!(
                        "discarding unreadable index structure in {}: {}",
                        self.path.display(),
                        e
                    );
                    self.init_structure()
                }
            },
        }
    }

    fn parse_structure(&self, header: &[u8]) -> Result<(Directory, u32)> {
        let header = FileHeader::from_bytes(header)?;
        if !(MIN_GLOBAL_DEPTH..=self.options.max_global_depth).contains(&header.global_depth) {
            return Err(IndexError::Corrupt(format!(
                "global depth {} out of range",
                header.global_depth
            )));
        }
        if header.next_page_idx < 2 {
            return Err(IndexError::Corrupt(format!(
                "next page index {} below initial page count",
                header.next_page_idx
            )));
        }

        let len = PageLayout::directory_len_bytes(header.global_depth);
        let bytes = self.read_up_to(self.layout.directory_offset(), len)?;
        let directory = Directory::from_bytes(header.global_depth, &bytes)?;
        if let Some(page) = directory
            .pages()
            .iter()
            .find(|p| **p >= header.next_page_idx)
        {
            return Err(IndexError::Corrupt(format!(
                "directory points at unallocated page {page}"
            )));
        }
        Ok((directory, header.next_page_idx))
    }

    fn init_structure(&mut self) -> Result<()> {
        self.directory = Directory::new();
        self.next_page_idx = 2;
        self.write_directory()?;
        let empty = Bucket::new(MIN_GLOBAL_DEPTH, self.options.bucket_capacity);
        for page in 0..2 {
            self.write_bucket(page, &empty)?;
        }
        Ok(())
    }

    fn write_directory(&mut self) -> Result<()> {
        let header = FileHeader {
            global_depth: self.directory.global_depth(),
            next_page_idx: self.next_page_idx,
        };
        let mut buf =
            Vec::with_capacity(header.byte_len() + self.directory.len() * DIRECTORY_ENTRY_SIZE);
        buf.extend(header.into_bytes());
        buf.extend(self.directory.to_bytes());
        self.write_at(self.layout.header_offset(), &buf)?;
        self.write_count += 1;
        Ok(())
    }

    fn read_bucket(&mut self, page: u32) -> Result<Bucket> {
        let offset = self.layout.page_offset(self.directory.global_depth(), page);
        let bytes = self.read_up_to(offset, self.layout.page_size())?;
        if bytes.len() != self.layout.page_size() {
            return Err(IndexError::Corrupt(format!(
                "page {page} is truncated to {} bytes",
                bytes.len()
            )));
        }
        self.read_count += 1;
        Bucket::from_page_bytes(&bytes, &self.record_layout, self.options.bucket_capacity)
    }

    fn write_bucket(&mut self, page: u32, bucket: &Bucket) -> Result<()> {
        let offset = self.layout.page_offset(self.directory.global_depth(), page);
        let bytes = bucket.to_page_bytes(&self.record_layout)?;
        self.write_at(offset, &bytes)?;
        self.write_count += 1;
        Ok(())
    }

    /// The bucket at `page` followed by every bucket reachable through its
    /// overflow pointers. Never empty.
    fn read_chain(&mut self, page: u32) -> Result<Vec<(u32, Bucket)>> {
        let mut chain = vec![];
        let mut current = Some(page);
        while let Some(p) = current {
            if p >= self.next_page_idx {
                return Err(IndexError::Corrupt(format!(
                    "chain from page {page} reaches unallocated page {p}"
                )));
            }
            if chain.len() > self.next_page_idx as usize {
                return Err(IndexError::Corrupt(format!("chain from page {page} loops")));
            }
            let bucket = self.read_bucket(p)?;
            current = bucket.overflow_page;
            chain.push((p, bucket));
        }
        Ok(chain)
    }

    fn open_file(&self) -> Result<File> {
        Ok(OpenOptions::new().read(true).write(true).open(&self.path)?)
    }

    /// Reads up to `len` bytes, fewer if the file ends first
    fn read_up_to(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut file = self.open_file()?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(len);
        file.take(len as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn write_at(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut file = self.open_file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        Ok(())
    }
}
