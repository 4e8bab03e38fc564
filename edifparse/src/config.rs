//! Parser configuration.

use crate::EdifParseError;

/// Default maximum token length. Must be a power of two.
pub const DEFAULT_MAX_TOKEN_LENGTH: usize = 8192 * 16 * 32;

/// Environment variable overriding the number of parse threads.
pub const THREADS_ENV: &str = "EDIF_PARSE_THREADS";

/// Tunables shared by the sequential and the parallel parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Longest token accepted. The ring tokenizer holds two
    /// of these, so it has to be a power of two.
    pub max_token_length: usize,
    /// A worker is only spawned for every this many bytes
    /// of input.
    pub min_bytes_per_thread: u64,
    /// Upper bound on worker count. `None` uses the current
    /// rayon thread count.
    pub max_threads: Option<usize>,
    /// Long-lived tokens at least this long are deduplicated
    /// through the string pool.
    pub intern_threshold: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            max_token_length: DEFAULT_MAX_TOKEN_LENGTH,
            min_bytes_per_thread: 8 * DEFAULT_MAX_TOKEN_LENGTH as u64,
            max_threads: None,
            intern_threshold: 8,
        }
    }
}

impl ParserConfig {
    /// default configuration with the thread count taken from
    /// `EDIF_PARSE_THREADS` when it is set.
    pub fn from_env() -> Self {
        let mut cfg = ParserConfig::default();
        if let Ok(v) = std::env::var(THREADS_ENV) {
            match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => cfg.max_threads = Some(n),
                _ => clilog::warn!(
                    EDIF_CONFIG,
                    "ignoring invalid {}={:?}", THREADS_ENV, v),
            }
        }
        cfg
    }

    /// Sets the maximum token length and rescales the per-thread
    /// threshold with it.
    pub fn with_max_token_length(mut self, len: usize) -> Self {
        self.max_token_length = len;
        self.min_bytes_per_thread = 8 * len as u64;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.max_threads = Some(threads);
        self
    }

    pub fn with_min_bytes_per_thread(mut self, bytes: u64) -> Self {
        self.min_bytes_per_thread = bytes;
        self
    }

    pub fn validate(&self) -> Result<(), EdifParseError> {
        if !self.max_token_length.is_power_of_two() {
            return Err(EdifParseError::InvalidConfig(format!(
                "max_token_length must be a power of two, got {}",
                self.max_token_length)));
        }
        if self.min_bytes_per_thread == 0 {
            return Err(EdifParseError::InvalidConfig(
                "min_bytes_per_thread must be positive".into()));
        }
        if self.max_threads == Some(0) {
            return Err(EdifParseError::InvalidConfig(
                "max_threads must be positive".into()));
        }
        Ok(())
    }

    /// Number of workers for a file of `file_size` bytes.
    pub fn thread_count(&self, file_size: u64) -> usize {
        let by_size = (file_size / self.min_bytes_per_thread).max(1);
        let avail = self.max_threads.unwrap_or_else(rayon::current_num_threads);
        (by_size.min(avail as u64) as usize).max(1)
    }
}

#[test]
fn test_thread_count() {
    let cfg = ParserConfig::default()
        .with_max_token_length(16)
        .with_threads(4);
    assert_eq!(cfg.min_bytes_per_thread, 128);
    assert_eq!(cfg.thread_count(0), 1);
    assert_eq!(cfg.thread_count(300), 2);
    assert_eq!(cfg.thread_count(100000), 4);
    assert!(cfg.validate().is_ok());
    assert!(ParserConfig::default().with_max_token_length(24).validate().is_err());
}
