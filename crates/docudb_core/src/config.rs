//! Database and collection configuration.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Flags controlling how a database directory is opened.
///
/// Combine with `|`:
///
/// ```rust,ignore
/// let mode = OpenMode::WRITER | OpenMode::CREATE | OpenMode::TSYNC;
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenMode(u16);

impl OpenMode {
    /// Open for reading.
    pub const READER: Self = Self(1 << 0);
    /// Open for writing (exclusive lock).
    pub const WRITER: Self = Self(1 << 1);
    /// Create the database directory if missing.
    pub const CREATE: Self = Self(1 << 2);
    /// Discard every existing collection at open.
    pub const TRUNCATE: Self = Self(1 << 3);
    /// Skip advisory locking.
    pub const NO_LOCK: Self = Self(1 << 4);
    /// Fail with `DatabaseLocked` instead of blocking on the lock.
    pub const LOCK_NB: Self = Self(1 << 5);
    /// Sync data files on every commit.
    pub const TSYNC: Self = Self(1 << 6);

    const NAMES: [(Self, &'static str); 7] = [
        (Self::READER, "READER"),
        (Self::WRITER, "WRITER"),
        (Self::CREATE, "CREATE"),
        (Self::TRUNCATE, "TRUNCATE"),
        (Self::NO_LOCK, "NO_LOCK"),
        (Self::LOCK_NB, "LOCK_NB"),
        (Self::TSYNC, "TSYNC"),
    ];

    /// The empty flag set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Whether every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of both flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns this set without the flags in `other`.
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Whether the database rejects every mutation.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        !self.contains(Self::WRITER)
    }
}

impl Default for OpenMode {
    fn default() -> Self {
        Self::WRITER | Self::CREATE
    }
}

impl BitOr for OpenMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for OpenMode {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl fmt::Debug for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "OpenMode({})", names.join(" | "))
    }
}

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Open-mode flags.
    pub open_mode: OpenMode,

    /// Whether to sync data files on every commit, in addition to `TSYNC`.
    pub sync_on_commit: bool,

    /// Maximum number of collections the database may hold.
    pub max_collections: usize,

    /// Whether `collection_or_create` may create collections implicitly.
    pub auto_create_collections: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            open_mode: OpenMode::default(),
            sync_on_commit: false,
            max_collections: 1024,
            auto_create_collections: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the open-mode flags.
    #[must_use]
    pub const fn open_mode(mut self, mode: OpenMode) -> Self {
        self.open_mode = mode;
        self
    }

    /// Sets whether to sync data files on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the collection limit.
    #[must_use]
    pub const fn max_collections(mut self, limit: usize) -> Self {
        self.max_collections = limit;
        self
    }

    /// Sets whether collections are created implicitly on first write.
    #[must_use]
    pub const fn auto_create_collections(mut self, value: bool) -> Self {
        self.auto_create_collections = value;
        self
    }

    /// Whether commits must reach stable storage before returning.
    #[must_use]
    pub const fn syncs_on_commit(&self) -> bool {
        self.sync_on_commit || self.open_mode.contains(OpenMode::TSYNC)
    }
}

/// Physical tuning of a collection, fixed at creation time.
///
/// All fields are hints except `large`, which lifts the 2 GiB data file cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectionOptions {
    /// Allow the data file to grow past 2 GiB.
    pub large: bool,
    /// Compress records on disk. Recorded and reported only.
    pub compressed: bool,
    /// Expected number of records. Recorded and reported only.
    pub records: u64,
    /// Maximum number of decoded documents kept in memory.
    pub cached_records: u32,
}

impl CollectionOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the large-file flag.
    #[must_use]
    pub const fn large(mut self, value: bool) -> Self {
        self.large = value;
        self
    }

    /// Sets the compression flag.
    #[must_use]
    pub const fn compressed(mut self, value: bool) -> Self {
        self.compressed = value;
        self
    }

    /// Sets the expected record count.
    #[must_use]
    pub const fn records(mut self, count: u64) -> Self {
        self.records = count;
        self
    }

    /// Sets the decoded-document cache size.
    #[must_use]
    pub const fn cached_records(mut self, count: u32) -> Self {
        self.cached_records = count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.open_mode, OpenMode::WRITER | OpenMode::CREATE);
        assert!(!config.open_mode.is_read_only());
        assert_eq!(config.max_collections, 1024);
        assert!(!config.syncs_on_commit());
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .open_mode(OpenMode::READER)
            .sync_on_commit(true)
            .max_collections(4)
            .auto_create_collections(false);

        assert!(config.open_mode.is_read_only());
        assert!(config.syncs_on_commit());
        assert_eq!(config.max_collections, 4);
        assert!(!config.auto_create_collections);
    }

    #[test]
    fn tsync_implies_sync_on_commit() {
        let config = Config::new().open_mode(OpenMode::default() | OpenMode::TSYNC);
        assert!(config.syncs_on_commit());
    }

    #[test]
    fn open_mode_flags() {
        let mut mode = OpenMode::READER;
        mode |= OpenMode::LOCK_NB;
        assert!(mode.contains(OpenMode::READER));
        assert!(mode.contains(OpenMode::LOCK_NB));
        assert!(!mode.contains(OpenMode::WRITER));
        assert!(!mode.without(OpenMode::LOCK_NB).contains(OpenMode::LOCK_NB));
        assert_eq!(format!("{mode:?}"), "OpenMode(READER | LOCK_NB)");
    }

    #[test]
    fn collection_options_builder() {
        let opts = CollectionOptions::new()
            .large(true)
            .compressed(true)
            .records(1_000)
            .cached_records(64);
        assert!(opts.large);
        assert!(opts.compressed);
        assert_eq!(opts.records, 1_000);
        assert_eq!(opts.cached_records, 64);
    }
}
