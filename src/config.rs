use std::path::PathBuf;

/// Compile-time-ish knobs for an [`crate::engine::EngineSession`]: no
/// environment variables, no on-line configuration beyond page size and
/// buffer-pool size, so this struct is built in code (by the CLI's
/// argument parsing, or by a test) rather than read from the
/// environment. `data_dir` holds one backing file per database, named
/// `<name>.db`, so `CREATE DATABASE`/`USE`/`SHOW DATABASES` have
/// somewhere to enumerate and address.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub page_size: usize,
    pub buffer_pool_size: usize,
    pub data_dir: PathBuf,
}

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pool_size: DEFAULT_BUFFER_POOL_SIZE,
            data_dir: data_dir.into(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_buffer_pool_size(mut self, size: usize) -> Self {
        self.buffer_pool_size = size;
        self
    }
}
