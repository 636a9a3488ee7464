/// Number of live record slots in a single bucket page
pub const BUCKET_SIZE: usize = 3;

/// Chain length allowed at global depth 0. The real ceiling is
/// `INITIAL_MAX_CHAIN + global_depth`.
pub const INITIAL_MAX_CHAIN: usize = 2;

/// Length prefix in front of the schema blob
pub const SCHEMA_LEN_PREFIX: usize = 4;

/// Global depth + next free page index
pub const FILE_HEADER_SIZE: usize = 8;

/// Local depth + overflow page
pub const BUCKET_HEADER_SIZE: usize = 8;

/// Width of a single directory entry
pub const DIRECTORY_ENTRY_SIZE: usize = 4;

/// On disk marker for "no overflow page"
pub const NO_OVERFLOW: i32 = -1;

pub const MIN_GLOBAL_DEPTH: u32 = 1;

pub const DEFAULT_MAX_GLOBAL_DEPTH: u32 = 24;

pub const DEFAULT_KEY_FIELD: &str = "id";

/// Reserved field carrying the soft-delete marker
pub const DELETED_FIELD: &str = "deleted";

pub const DEFAULT_HASH_DB_FILE: &str = "hash_data.db";

pub const DEFAULT_SCHEMA: &str = "id:int,value:str(32)";
