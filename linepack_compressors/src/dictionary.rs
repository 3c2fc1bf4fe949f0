use log::trace;

use linepack_core::config::MAX_DICTIONARY_SIZE;
use linepack_core::CompressionError;

/// Fixed-capacity table of previously seen base values.
///
/// Replacement is FIFO over a ring of `capacity` slots: while the table has
/// free slots, entries are appended; once full, each insert overwrites the
/// oldest entry and the new value takes over its index. Indices therefore
/// stay stable until the slot is reused, and the whole state is a pure
/// function of the insert sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    entries: Vec<u64>,
    capacity: usize,
    /// Slot overwritten by the next insert once the table is full.
    cursor: usize,
}

impl Dictionary {
    /// Empty dictionary of `capacity` slots, in `1..=MAX_DICTIONARY_SIZE`.
    pub fn new(capacity: usize) -> Result<Self, CompressionError> {
        if capacity == 0 || capacity > MAX_DICTIONARY_SIZE {
            return Err(CompressionError::InvalidConfig(format!(
                "dictionary capacity must be in 1..={}, got {}",
                MAX_DICTIONARY_SIZE, capacity
            )));
        }
        Ok(Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
        })
    }

    /// Lowest index holding `value`, if any.
    pub fn lookup(&self, value: u64) -> Option<usize> {
        self.entries.iter().position(|&e| e == value)
    }

    /// Add `value`, evicting the oldest entry when full. Returns its index.
    pub fn insert(&mut self, value: u64) -> usize {
        if self.entries.len() < self.capacity {
            self.entries.push(value);
            return self.entries.len() - 1;
        }
        let index = self.cursor;
        trace!(
            "dictionary full: evicting {:#x} from slot {} for {:#x}",
            self.entries[index],
            index,
            value
        );
        self.entries[index] = value;
        self.cursor = (self.cursor + 1) % self.capacity;
        index
    }

    pub fn get(&self, index: usize) -> Option<u64> {
        self.entries.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries in index order.
    pub fn entries(&self) -> &[u64] {
        &self.entries
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    /// Bits needed to address any slot: `ceil(log2(capacity))`.
    pub fn index_bits(&self) -> u32 {
        self.capacity.next_power_of_two().trailing_zeros()
    }

    /// Snapshot layout: capacity u32, cursor u32, len u32, then `len` u64
    /// entries, all little-endian.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12 + self.entries.len() * 8);
        buf.extend_from_slice(&(self.capacity as u32).to_le_bytes());
        buf.extend_from_slice(&(self.cursor as u32).to_le_bytes());
        buf.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            buf.extend_from_slice(&entry.to_le_bytes());
        }
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, CompressionError> {
        let field = |at: usize| -> Result<usize, CompressionError> {
            buf.get(at..at + 4)
                .and_then(|b| b.try_into().ok())
                .map(|b| u32::from_le_bytes(b) as usize)
                .ok_or_else(|| CompressionError::malformed("dictionary snapshot truncated"))
        };
        let capacity = field(0)?;
        let cursor = field(4)?;
        let len = field(8)?;

        if capacity == 0
            || capacity > MAX_DICTIONARY_SIZE
            || len > capacity
            || cursor >= capacity
            || (len < capacity && cursor != 0)
        {
            return Err(CompressionError::malformed(format!(
                "inconsistent dictionary snapshot: capacity {}, cursor {}, len {}",
                capacity, cursor, len
            )));
        }
        if buf.len() != 12 + len * 8 {
            return Err(CompressionError::malformed(format!(
                "dictionary snapshot of {} entries has {} bytes",
                len,
                buf.len()
            )));
        }

        let entries = buf[12..]
            .chunks_exact(8)
            .map(|c| {
                let mut word = [0u8; 8];
                word.copy_from_slice(c);
                u64::from_le_bytes(word)
            })
            .collect();
        Ok(Self {
            entries,
            capacity,
            cursor,
        })
    }
}
