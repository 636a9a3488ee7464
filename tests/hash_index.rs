use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use silly_hash_index::{
    fields, read_schema, CorruptionPolicy, Fields, HashFunction, HashStorage, IndexError,
    IndexOptions, Schema, Value,
};
use tempfile::TempDir;

fn schema() -> Schema {
    "id:int,name:str(24),score:float".parse().expect("schema")
}

fn row(id: i64) -> Fields {
    fields! {"id" => id, "name" => format!("row-{id}"), "score" => id as f64 / 2.0}
}

fn create(dir: &TempDir, options: IndexOptions) -> HashStorage {
    HashStorage::create(dir.path().join("index.db"), &schema(), options).expect("create index")
}

fn ids(records: &[Fields]) -> Vec<i64> {
    let mut ids: Vec<i64> = records
        .iter()
        .map(|r| match r.get("id") {
            Some(Value::Int(id)) => *id,
            other => panic!("record without int id: {other:?}"),
        })
        .collect();
    ids.sort_unstable();
    ids
}

fn overwrite_header(path: &Path, bytes: &[u8]) {
    let (_, blob_len) = read_schema(path).expect("read schema").expect("schema present");
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .expect("open index file");
    file.seek(SeekFrom::Start(4 + blob_len)).expect("seek");
    file.write_all(bytes).expect("write header");
}

#[test]
fn seven_ascending_keys_come_back_exactly_once() {
    let dir = TempDir::new().expect("temp dir");
    let mut index = create(&dir, IndexOptions::default());
    for id in 0..7 {
        index.insert(row(id)).expect("insert");
    }
    assert_eq!(ids(&index.all_records().expect("scan")), (0..7).collect::<Vec<_>>());
    for id in 0..7 {
        assert_eq!(index.find(&Value::Int(id)).expect("find"), vec![row(id)]);
    }
}

#[test]
fn inserting_and_removing_four_keys_leaves_minimum_depth() {
    let dir = TempDir::new().expect("temp dir");
    let mut index = create(&dir, IndexOptions::default());
    for id in 1..=4 {
        index.insert(row(id)).expect("insert");
    }
    for id in 1..=4 {
        let removed = index.remove(&Value::Int(id)).expect("remove");
        assert_eq!(removed, Some(vec![row(id)]));
    }
    assert!(index.all_records().expect("scan").is_empty());
    assert_eq!(index.global_depth(), 1);
    assert_eq!(index.directory().len(), 2);
}

#[test]
fn never_inserted_key_finds_nothing() {
    let dir = TempDir::new().expect("temp dir");
    let mut index = create(&dir, IndexOptions::default());
    index.insert(row(1)).expect("insert");
    assert!(index.find(&Value::Int(2)).expect("find").is_empty());
    assert!(index.find(&Value::Int(1 << 40)).expect("find").is_empty());
}

#[test]
fn growth_keeps_every_record_reachable() {
    for hash in [HashFunction::Additive, HashFunction::XxHash] {
        let dir = TempDir::new().expect("temp dir");
        let mut index = create(&dir, IndexOptions::default().with_hash(hash));

        for id in 0..300 {
            index.insert(row(id)).expect("insert");
            assert_eq!(index.directory().len(), 1 << index.global_depth());
        }
        assert!(index.global_depth() > 1, "{hash:?} never split");

        let mut removed = 0;
        for id in (0..300).filter(|id| id % 3 == 0) {
            let gone = index.remove(&Value::Int(id)).expect("remove").expect("present");
            removed += gone.len();
            assert!(index.find(&Value::Int(id)).expect("find").is_empty());
        }

        let remaining = index.all_records().expect("scan");
        assert_eq!(remaining.len(), 300 - removed);
        let unique: BTreeSet<i64> = ids(&remaining).into_iter().collect();
        assert_eq!(unique.len(), remaining.len());
        for id in (0..300).filter(|id| id % 3 != 0) {
            assert_eq!(index.find(&Value::Int(id)).expect("find"), vec![row(id)]);
        }

        let report = index.verify().expect("verify");
        assert!(report.is_clean(), "{hash:?}: {:?}", report.violations);
    }
}

#[test]
fn removing_everything_shrinks_without_reclaiming_pages() {
    let dir = TempDir::new().expect("temp dir");
    let mut index = create(&dir, IndexOptions::default());
    for id in 0..120 {
        index.insert(row(id)).expect("insert");
    }
    let peak_depth = index.global_depth();
    let pages = index.next_page_idx();

    for id in 0..120 {
        let before = index.global_depth();
        index.remove(&Value::Int(id)).expect("remove");
        assert!(index.global_depth() <= before);
        assert_eq!(index.next_page_idx(), pages);
    }

    assert!(index.all_records().expect("scan").is_empty());
    assert!(index.global_depth() <= peak_depth);
    assert!(index.verify().expect("verify").is_clean());
}

#[test]
fn reopening_sees_the_same_structure() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("index.db");
    let (depth, directory) = {
        let mut index = create(&dir, IndexOptions::default());
        for id in 0..80 {
            index.insert(row(id)).expect("insert");
        }
        index.remove(&Value::Int(10)).expect("remove");
        (index.global_depth(), index.directory().clone())
    };

    let mut index = HashStorage::open(&path, IndexOptions::default()).expect("reopen");
    assert_eq!(index.global_depth(), depth);
    assert_eq!(index.directory(), &directory);
    assert_eq!(index.schema(), &schema());
    assert_eq!(index.all_records().expect("scan").len(), 79);
    assert!(index.find(&Value::Int(10)).expect("find").is_empty());
    assert_eq!(index.find(&Value::Int(79)).expect("find"), vec![row(79)]);
}

#[test]
fn reopening_keeps_the_options_the_file_was_built_with() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("index.db");
    let built_with = IndexOptions {
        bucket_capacity: 4,
        ..IndexOptions::default()
    };
    {
        let mut index = create(&dir, built_with.clone());
        for id in 0..20 {
            index.insert(row(id)).expect("insert");
        }
    }

    let mut index = HashStorage::open(&path, IndexOptions::strict()).expect("reopen");
    assert_eq!(index.options().shape(), built_with.shape());
    assert_eq!(index.options().on_corrupt, CorruptionPolicy::Fail);
    assert_eq!(index.all_records().expect("scan").len(), 20);
    for id in 0..20 {
        assert_eq!(index.find(&Value::Int(id)).expect("find"), vec![row(id)]);
    }

    index.insert(row(20)).expect("insert after reopen");
    assert!(index.verify().expect("verify").is_clean());
}

#[test]
fn reopening_with_another_hash_still_finds_everything() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("index.db");
    {
        let mut index = create(&dir, IndexOptions::default().with_hash(HashFunction::XxHash));
        for id in 0..40 {
            index.insert(row(id)).expect("insert");
        }
    }

    let options = IndexOptions::default().with_hash(HashFunction::Additive);
    let mut index = HashStorage::open(&path, options).expect("reopen");
    assert_eq!(index.options().hash, HashFunction::XxHash);
    for id in 0..40 {
        assert_eq!(index.find(&Value::Int(id)).expect("find"), vec![row(id)]);
    }
}

#[test]
fn string_keys_use_the_configured_key_field() {
    let dir = TempDir::new().expect("temp dir");
    let mut index = create(&dir, IndexOptions::default().with_key_field("name"));
    for id in 0..40 {
        index.insert(row(id)).expect("insert");
    }
    // "ab" and "ba" collide under the additive hash
    index
        .insert(fields! {"id" => 100i64, "name" => "ab", "score" => 0.0})
        .expect("insert");
    index
        .insert(fields! {"id" => 101i64, "name" => "ba", "score" => 0.0})
        .expect("insert");

    assert_eq!(index.find(&Value::from("row-17")).expect("find"), vec![row(17)]);
    assert_eq!(index.find(&Value::from("ab")).expect("find").len(), 1);
    assert_eq!(index.find(&Value::from("ba")).expect("find").len(), 1);
    assert!(index.find(&Value::Int(17)).expect("find").is_empty());
}

#[test]
fn soft_deleted_records_never_resurface() {
    let dir = TempDir::new().expect("temp dir");
    let mut index = create(&dir, IndexOptions::default());
    let mut hidden = row(3);
    hidden.insert("deleted".to_string(), Value::Bool(true));
    index.insert(hidden).expect("insert");
    index.insert(row(3)).expect("insert");

    assert_eq!(index.find(&Value::Int(3)).expect("find"), vec![row(3)]);
    assert_eq!(index.all_records().expect("scan"), vec![row(3)]);
}

#[test]
fn blank_header_is_reinitialized_silently() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("index.db");
    {
        let mut index = create(&dir, IndexOptions::default());
        index.insert(row(1)).expect("insert");
    }
    overwrite_header(&path, &[0; 8]);

    let mut index = HashStorage::open(&path, IndexOptions::strict()).expect("open");
    assert_eq!(index.global_depth(), 1);
    assert!(index.all_records().expect("scan").is_empty());
}

#[test]
fn corrupt_header_follows_the_corruption_policy() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("index.db");
    {
        let mut index = create(&dir, IndexOptions::default());
        for id in 0..30 {
            index.insert(row(id)).expect("insert");
        }
    }
    let mut header = Vec::new();
    header.extend(99_i32.to_le_bytes());
    header.extend(5_i32.to_le_bytes());
    overwrite_header(&path, &header);

    let strict = HashStorage::open(&path, IndexOptions::strict());
    assert!(matches!(strict, Err(IndexError::Corrupt(_))));

    let options = IndexOptions {
        on_corrupt: CorruptionPolicy::Reinitialize,
        ..IndexOptions::default()
    };
    let mut index = HashStorage::open(&path, options).expect("reinitialize");
    assert_eq!(index.global_depth(), 1);
    assert_eq!(index.next_page_idx(), 2);
    assert!(index.all_records().expect("scan").is_empty());
    index.insert(row(1)).expect("insert after reinit");
    assert_eq!(index.find(&Value::Int(1)).expect("find"), vec![row(1)]);
}

#[test]
fn truncated_directory_counts_as_corrupt() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("index.db");
    drop(create(&dir, IndexOptions::default()));

    let (_, blob_len) = read_schema(&path).expect("read schema").expect("schema present");
    let file = OpenOptions::new()
        .write(true)
        .open(&path)
        .expect("open index file");
    let mut header = Vec::new();
    header.extend(3_i32.to_le_bytes());
    header.extend(2_i32.to_le_bytes());
    file.set_len(4 + blob_len).expect("truncate");
    drop(file);
    overwrite_header(&path, &header);

    let strict = HashStorage::open(&path, IndexOptions::strict());
    assert!(matches!(strict, Err(IndexError::Corrupt(_))));
    let index = HashStorage::open(&path, IndexOptions::default()).expect("reinitialize");
    assert_eq!(index.directory().pages(), &[0, 1]);
}

#[test]
fn opening_a_missing_file_needs_a_schema() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("nothing.db");
    let opened = HashStorage::open(&path, IndexOptions::default());
    assert!(matches!(opened, Err(IndexError::MissingSchema(_))));

    let index = HashStorage::open_or_create(&path, &schema(), IndexOptions::default())
        .expect("open or create");
    assert_eq!(index.global_depth(), 1);
}
