use crate::cache::ImportState;
use crate::field::FieldEncoding;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError {
    #[error("cannot {operation} while the cache is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: ImportState,
    },

    #[error("field is already registered as #{index}")]
    FieldAlreadyRegistered { index: usize },

    #[error("unknown field #{0}")]
    UnknownField(usize),

    #[error("field #{field} has invalid group parent #{parent}: {reason}")]
    InvalidGroupParent {
        field: usize,
        parent: usize,
        reason: &'static str,
    },

    #[error("cannot {operation} on field #{field} with {encoding:?} encoding")]
    WrongCodec {
        field: usize,
        encoding: FieldEncoding,
        operation: &'static str,
    },

    #[error("value {value} is not in the dictionary of field #{field}")]
    ValueNotInDictionary { field: usize, value: String },

    #[error("dictionary position {position} out of range for field #{field} ({len} items)")]
    DictionaryIndexOutOfRange {
        field: usize,
        position: usize,
        len: usize,
    },

    #[error("dictionary of field #{field} has {len} items, more than an indexed slot can address")]
    DictionaryTooLarge { field: usize, len: usize },

    #[error("record {record} out of range ({len} records)")]
    RecordOutOfRange { record: usize, len: usize },

    #[error("cannot trim to {requested} records, only {written} were written")]
    TrimBeyondWritten { requested: usize, written: usize },

    #[error("{records} records of {record_size} bytes overflow the address space")]
    CapacityOverflow { records: usize, record_size: usize },

    #[error("failed to allocate storage for {records} records")]
    Allocation { records: usize },

    #[error("invalid bucketer: {0}")]
    InvalidBucketer(String),
}

impl CacheError {
    /// Programmer errors: an operation called in the wrong state or through the wrong codec.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            CacheError::InvalidState { .. }
                | CacheError::FieldAlreadyRegistered { .. }
                | CacheError::UnknownField(_)
                | CacheError::InvalidGroupParent { .. }
                | CacheError::WrongCodec { .. }
                | CacheError::ValueNotInDictionary { .. }
        )
    }

    pub fn is_capacity_error(&self) -> bool {
        matches!(
            self,
            CacheError::CapacityOverflow { .. }
                | CacheError::Allocation { .. }
                | CacheError::DictionaryTooLarge { .. }
        )
    }
}
