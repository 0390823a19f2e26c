//! In-memory pivot cache records for Formula.
//!
//! A [`DataCache`] holds a homogeneous table of records imported in bulk from an external source
//! (a worksheet range, a database query) so pivot tables can slice, group and aggregate them.
//!
//! This crate focuses on:
//! - Per-field storage choice: each field is stored either inline (a full value per record) or as
//!   an 8/16/32-bit reference into a per-field dictionary, whichever addresses the dictionary in
//!   the fewest bytes.
//! - Group-parent fields that carry no storage and read their parent's values instead.
//! - A two-phase import protocol (`begin_import` -> writes -> `end_import`) with typed errors for
//!   every misuse.
//! - Ordering record indices by a list of fields, honoring bucketers (date parts, numeric ranges).

#![forbid(unsafe_code)]

mod bucketer;
mod cache;
mod codec;
mod error;
mod field;
mod options;
mod permute;
mod records;
mod source;
mod value;

pub use crate::bucketer::{Bucketer, DateUnit, BUCKET_BEFORE_RANGE, BUCKET_NONE};
pub use crate::cache::{CacheMetadata, DataCache, ImportState, SourceDescriptor};
pub use crate::error::{CacheError, CacheResult};
pub use crate::field::{
    CacheField, FieldDictionary, FieldEncoding, MAX_INDEXED16_ITEMS, MAX_INDEXED8_ITEMS,
};
pub use crate::options::{CacheOptions, DEFAULT_GROWTH_STEP};
pub use crate::records::INLINE_SLOT_WIDTH;
pub use crate::source::{CacheSource, ImportSink, RowSource};
pub use crate::value::{ErrorKind, Scalar, Value, ValueKey};
