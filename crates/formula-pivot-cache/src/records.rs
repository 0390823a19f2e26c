//! Fixed-size record storage.
//!
//! Every record is a `record_size` byte slot inside one contiguous buffer. Indexed fields store
//! their 1-based dictionary position little-endian at the field's offset. Inline fields store a
//! 1-based handle into an arena of values owned by the store; 0 means "missing" for both.
//!
//! The arena is the only owner of inline values, so a value is released exactly once: when its
//! slot is overwritten or cleared, when its record is trimmed away, or when the store is dropped.

use crate::error::{CacheError, CacheResult};
use crate::field::FieldEncoding;
use crate::value::Value;

/// Bytes used by an inline slot (a `u32` arena handle).
pub const INLINE_SLOT_WIDTH: usize = std::mem::size_of::<u32>();

#[derive(Debug, Clone, Default)]
struct InlineArena {
    slots: Vec<Option<Value>>,
    free: Vec<u32>,
}

impl InlineArena {
    fn insert(&mut self, value: Value) -> CacheResult<u32> {
        if let Some(handle) = self.free.pop() {
            self.slots[handle as usize - 1] = Some(value);
            return Ok(handle);
        }
        let handle = u32::try_from(self.slots.len() + 1).map_err(|_| CacheError::Allocation {
            records: self.slots.len(),
        })?;
        self.slots.push(Some(value));
        Ok(handle)
    }

    fn replace(&mut self, handle: u32, value: Value) {
        self.slots[handle as usize - 1] = Some(value);
    }

    fn release(&mut self, handle: u32) {
        if let Some(slot) = self.slots.get_mut(handle as usize - 1) {
            if slot.take().is_some() {
                self.free.push(handle);
            }
        }
    }

    fn get(&self, handle: u32) -> Option<&Value> {
        self.slots.get(handle as usize - 1)?.as_ref()
    }

    fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    fn clear(&mut self) {
        self.slots = Vec::new();
        self.free = Vec::new();
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordStore {
    bytes: Vec<u8>,
    record_size: usize,
    capacity: usize,
    logical_count: usize,
    growth_step: usize,
    inline_offsets: Vec<usize>,
    arena: InlineArena,
}

impl RecordStore {
    pub fn new(record_size: usize, inline_offsets: Vec<usize>, growth_step: usize) -> Self {
        Self {
            bytes: Vec::new(),
            record_size,
            capacity: 0,
            logical_count: 0,
            growth_step: growth_step.max(1),
            inline_offsets,
            arena: InlineArena::default(),
        }
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn logical_count(&self) -> usize {
        self.logical_count
    }

    pub fn live_inline_values(&self) -> usize {
        self.arena.live()
    }

    /// Grow to exactly `n` zeroed slots. Never shrinks; on error the store is unchanged.
    pub fn ensure_capacity(&mut self, n: usize) -> CacheResult<()> {
        if n <= self.capacity {
            return Ok(());
        }
        let len = n
            .checked_mul(self.record_size)
            .filter(|len| *len <= isize::MAX as usize)
            .ok_or(CacheError::CapacityOverflow {
                records: n,
                record_size: self.record_size,
            })?;
        self.bytes
            .try_reserve_exact(len - self.bytes.len())
            .map_err(|_| CacheError::Allocation { records: n })?;
        self.bytes.resize(len, 0);
        self.capacity = n;
        Ok(())
    }

    /// Mutable bytes of record `i`, growing the store in `growth_step` increments if needed.
    pub fn record_slot(&mut self, i: usize) -> CacheResult<&mut [u8]> {
        if i >= self.capacity {
            let target = i
                .checked_add(self.growth_step)
                .ok_or(CacheError::CapacityOverflow {
                    records: i,
                    record_size: self.record_size,
                })?;
            log::trace!("growing record store from {} to {target} slots", self.capacity);
            self.ensure_capacity(target)?;
        }
        if i >= self.logical_count {
            self.logical_count = i + 1;
        }
        let start = i * self.record_size;
        Ok(&mut self.bytes[start..start + self.record_size])
    }

    pub fn record(&self, i: usize) -> CacheResult<&[u8]> {
        if i >= self.logical_count {
            return Err(CacheError::RecordOutOfRange {
                record: i,
                len: self.logical_count,
            });
        }
        let start = i * self.record_size;
        Ok(&self.bytes[start..start + self.record_size])
    }

    /// Shrink to exactly `n` slots, releasing inline values of any records past `n`.
    pub fn trim(&mut self, n: usize) -> CacheResult<()> {
        if n > self.logical_count {
            return Err(CacheError::TrimBeyondWritten {
                requested: n,
                written: self.logical_count,
            });
        }
        if n == self.capacity {
            return Ok(());
        }
        for record in n..self.logical_count {
            self.release_inline(record);
        }
        self.logical_count = n;
        self.bytes.truncate(n * self.record_size);
        self.bytes.shrink_to_fit();
        self.capacity = n;
        Ok(())
    }

    /// Drop every record and inline value.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.bytes = Vec::new();
        self.capacity = 0;
        self.logical_count = 0;
    }

    pub fn write_index(
        &mut self,
        record: usize,
        offset: usize,
        encoding: FieldEncoding,
        stored: u32,
    ) -> CacheResult<()> {
        let slot = self.record_slot(record)?;
        encode_index(&mut slot[offset..offset + encoding.width()], encoding, stored);
        Ok(())
    }

    /// Raw stored index (0 = missing).
    pub fn read_index(
        &self,
        record: usize,
        offset: usize,
        encoding: FieldEncoding,
    ) -> CacheResult<u32> {
        let slot = self.record(record)?;
        Ok(decode_index(&slot[offset..offset + encoding.width()], encoding))
    }

    /// Store `value` in an inline slot, releasing whatever the slot held before.
    pub fn write_inline(
        &mut self,
        record: usize,
        offset: usize,
        value: Option<Value>,
    ) -> CacheResult<()> {
        let existing = {
            let slot = self.record_slot(record)?;
            decode_index(&slot[offset..offset + INLINE_SLOT_WIDTH], FieldEncoding::Inline)
        };

        let handle = match (existing, value) {
            (0, None) => return Ok(()),
            (0, Some(value)) => self.arena.insert(value)?,
            (handle, Some(value)) => {
                self.arena.replace(handle, value);
                return Ok(());
            }
            (handle, None) => {
                self.arena.release(handle);
                0
            }
        };

        let start = record * self.record_size + offset;
        encode_index(
            &mut self.bytes[start..start + INLINE_SLOT_WIDTH],
            FieldEncoding::Inline,
            handle,
        );
        Ok(())
    }

    pub fn read_inline(&self, record: usize, offset: usize) -> CacheResult<Option<&Value>> {
        let slot = self.record(record)?;
        match decode_index(&slot[offset..offset + INLINE_SLOT_WIDTH], FieldEncoding::Inline) {
            0 => Ok(None),
            handle => Ok(self.arena.get(handle)),
        }
    }

    fn release_inline(&mut self, record: usize) {
        let start = record * self.record_size;
        for &offset in &self.inline_offsets {
            let bytes = &mut self.bytes[start + offset..start + offset + INLINE_SLOT_WIDTH];
            let handle = decode_index(bytes, FieldEncoding::Inline);
            if handle != 0 {
                bytes.fill(0);
                self.arena.release(handle);
            }
        }
    }
}

fn encode_index(bytes: &mut [u8], encoding: FieldEncoding, stored: u32) {
    match encoding {
        FieldEncoding::Delegated => {}
        FieldEncoding::Indexed8 => {
            debug_assert!(stored <= u32::from(u8::MAX));
            bytes.copy_from_slice(&(stored as u8).to_le_bytes());
        }
        FieldEncoding::Indexed16 => {
            debug_assert!(stored <= u32::from(u16::MAX));
            bytes.copy_from_slice(&(stored as u16).to_le_bytes());
        }
        FieldEncoding::Indexed32 | FieldEncoding::Inline => {
            bytes.copy_from_slice(&stored.to_le_bytes());
        }
    }
}

fn decode_index(bytes: &[u8], encoding: FieldEncoding) -> u32 {
    match encoding {
        FieldEncoding::Delegated => 0,
        FieldEncoding::Indexed8 => u32::from(bytes[0]),
        FieldEncoding::Indexed16 => u32::from(u16::from_le_bytes([bytes[0], bytes[1]])),
        FieldEncoding::Indexed32 | FieldEncoding::Inline => {
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        }
    }
}
