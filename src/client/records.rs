//! Expiry records and the fixed scan queries

use crate::stream::{FromRow, Row};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Highest last access block seen in `accounts_last_access`
pub const MAX_BLOCK_QUERY: &str = "SELECT max(last_access_block) FROM default.accounts_last_access";

/// Accounts last accessed in `[?, ?)`
pub const EXPIRED_ACCOUNTS_QUERY: &str =
    "SELECT address FROM default.accounts_last_access FINAL \
     WHERE last_access_block >= ? AND last_access_block < ?";

/// Live storage slots last accessed in `[?, ?)`
pub const EXPIRED_SLOTS_QUERY: &str =
    "SELECT address, slot_key FROM default.storage_last_access FINAL \
     WHERE last_access_block >= ? AND last_access_block < ? AND is_deleted = false";

/// Half-open block interval `[start, end)`
///
/// Ordering is not validated: an empty or inverted range simply matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    /// First block included
    pub start: u64,
    /// First block excluded
    pub end: u64,
}

impl BlockRange {
    /// Create a range
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Whether `block` falls inside the range
    pub fn contains(&self, block: u64) -> bool {
        self.start <= block && block < self.end
    }

    /// Whether the range matches no block
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl From<std::ops::Range<u64>> for BlockRange {
    fn from(range: std::ops::Range<u64>) -> Self {
        Self::new(range.start, range.end)
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Account whose last access falls in the scanned range
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpiredAccount {
    /// Account address
    pub address: String,
}

impl FromRow for ExpiredAccount {
    fn from_row(row: &Row) -> Result<Self> {
        row.expect_columns(1)?;
        Ok(Self {
            address: row.get(0)?,
        })
    }
}

/// Storage slot whose last access falls in the scanned range
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpiredSlot {
    /// Owning account address
    pub address: String,
    /// Slot key
    pub slot_key: String,
}

impl FromRow for ExpiredSlot {
    fn from_row(row: &Row) -> Result<Self> {
        row.expect_columns(2)?;
        Ok(Self {
            address: row.get(0)?,
            slot_key: row.get(1)?,
        })
    }
}
