//! Per-field reads and writes that hide the chosen encoding.

use crate::cache::{DataCache, ImportState};
use crate::error::{CacheError, CacheResult};
use crate::field::FieldEncoding;
use crate::value::Value;

impl DataCache {
    /// Store a value in an `Inline` field, releasing whatever the slot held before.
    ///
    /// Indexed fields must be written with [`DataCache::set_index`]; delegated fields have no
    /// storage at all.
    pub fn set_value(&mut self, field: usize, record: usize, value: Value) -> CacheResult<()> {
        self.require_state("set a value", ImportState::Importing)?;
        let f = self.field_checked(field)?;
        match f.encoding() {
            FieldEncoding::Inline => {
                let offset = f.offset();
                self.records.write_inline(record, offset, Some(value))
            }
            encoding => Err(CacheError::WrongCodec {
                field,
                encoding,
                operation: "set a value",
            }),
        }
    }

    /// Mark a slot as holding no value.
    pub fn clear_value(&mut self, field: usize, record: usize) -> CacheResult<()> {
        self.require_state("clear a value", ImportState::Importing)?;
        let f = self.field_checked(field)?;
        let offset = f.offset();
        match f.encoding() {
            FieldEncoding::Inline => self.records.write_inline(record, offset, None),
            FieldEncoding::Delegated => Err(CacheError::WrongCodec {
                field,
                encoding: FieldEncoding::Delegated,
                operation: "clear a value",
            }),
            encoding => self.records.write_index(record, offset, encoding, 0),
        }
    }

    /// Store a zero-based dictionary position in an indexed field.
    pub fn set_index(&mut self, field: usize, record: usize, position: usize) -> CacheResult<()> {
        self.require_state("set an index", ImportState::Importing)?;
        let f = self.field_checked(field)?;
        let encoding = f.encoding();
        if !encoding.is_indexed() {
            return Err(CacheError::WrongCodec {
                field,
                encoding,
                operation: "set an index",
            });
        }
        let len = f.dictionary().len();
        if position >= len {
            return Err(CacheError::DictionaryIndexOutOfRange {
                field,
                position,
                len,
            });
        }
        // Layout guarantees `len` fits the encoding with room for the 0 sentinel.
        let stored = u32::try_from(position + 1).map_err(|_| CacheError::DictionaryIndexOutOfRange {
            field,
            position,
            len,
        })?;
        let offset = f.offset();
        self.records.write_index(record, offset, encoding, stored)
    }

    /// Zero-based dictionary position stored for `record`, or `None` if nothing was recorded.
    ///
    /// Only indexed fields have positions; other encodings report [`CacheError::WrongCodec`].
    pub fn get_index(&self, field: usize, record: usize) -> CacheResult<Option<usize>> {
        self.require_layout("get an index")?;
        let f = self.field_checked(field)?;
        let encoding = f.encoding();
        if !encoding.is_indexed() {
            return Err(CacheError::WrongCodec {
                field,
                encoding,
                operation: "get an index",
            });
        }
        match self.records.read_index(record, f.offset(), encoding)? {
            0 => Ok(None),
            stored => Ok(Some(stored as usize - 1)),
        }
    }

    /// Effective value of `field` for `record`; `None` is the missing value.
    pub fn get_value(&self, field: usize, record: usize) -> CacheResult<Option<&Value>> {
        self.require_layout("get a value")?;
        let f = self.field_checked(field)?;
        match f.encoding() {
            FieldEncoding::Delegated => match f.group_parent() {
                Some(parent) => self.get_value(parent, record),
                // No storage and no parent: nothing to read, but the record must still exist.
                None => self.records.record(record).map(|_| None),
            },
            FieldEncoding::Inline => self.records.read_inline(record, f.offset()),
            encoding => match self.records.read_index(record, f.offset(), encoding)? {
                0 => Ok(None),
                stored => Ok(f.dictionary().get(stored as usize - 1)),
            },
        }
    }
}
