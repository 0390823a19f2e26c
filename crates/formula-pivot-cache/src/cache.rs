use crate::error::{CacheError, CacheResult};
use crate::field::{compute_layout, CacheField, FieldEncoding};
use crate::options::CacheOptions;
use crate::records::RecordStore;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Lifecycle of a [`DataCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportState {
    /// Fields may be registered and their dictionaries populated.
    Open,
    /// Layout is fixed; records are being filled.
    Importing,
    /// Storage is trimmed to the final row count and read-only.
    Sealed,
}

/// Descriptive refresh information carried alongside the records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refreshed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refreshed_on: Option<Value>,
    #[serde(default = "default_true")]
    pub refresh_upgrades: bool,
    #[serde(default = "default_version")]
    pub created_version: u32,
    #[serde(default = "default_version")]
    pub refresh_version: u32,
}

impl Default for CacheMetadata {
    fn default() -> Self {
        Self {
            refreshed_by: None,
            refreshed_on: None,
            refresh_upgrades: true,
            created_version: default_version(),
            refresh_version: default_version(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_version() -> u32 {
    1
}

/// Where the records came from. The cache never reads from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SourceDescriptor {
    Worksheet { sheet: String, range: String },
    DefinedName { name: String },
    External { connection: String, command: String },
}

/// A bulk-imported, in-memory table of records with per-field encodings.
///
/// Usage follows a strict two-phase protocol:
///
/// 1. register fields with [`DataCache::add_field`] and populate their dictionaries;
/// 2. [`DataCache::begin_import`] fixes the layout, values are written through the codec
///    ([`DataCache::set_value`] / [`DataCache::set_index`]) or a [`crate::CacheSource`], and
///    [`DataCache::end_import`] seals the cache.
#[derive(Debug, Clone)]
pub struct DataCache {
    fields: Vec<CacheField>,
    pub(crate) records: RecordStore,
    state: ImportState,
    options: CacheOptions,
    metadata: CacheMetadata,
    source: Option<SourceDescriptor>,
}

impl Default for DataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DataCache {
    pub fn new() -> Self {
        Self::with_options(CacheOptions::default())
    }

    pub fn with_options(options: CacheOptions) -> Self {
        Self {
            fields: Vec::new(),
            records: RecordStore::new(0, Vec::new(), options.growth_step),
            state: ImportState::Open,
            options,
            metadata: CacheMetadata::default(),
            source: None,
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn metadata(&self) -> &CacheMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut CacheMetadata {
        &mut self.metadata
    }

    pub fn source(&self) -> Option<&SourceDescriptor> {
        self.source.as_ref()
    }

    pub fn set_source(&mut self, source: Option<SourceDescriptor>) {
        self.source = source;
    }

    /// Register a field, returning its index.
    pub fn add_field(&mut self, mut field: CacheField) -> CacheResult<usize> {
        self.require_state("add a field", ImportState::Open)?;
        if let Some(index) = field.index() {
            return Err(CacheError::FieldAlreadyRegistered { index });
        }
        let index = self.fields.len();
        field.set_index(index);
        self.fields.push(field);
        Ok(index)
    }

    /// Add `value` to a registered field's dictionary. Dictionaries freeze at `begin_import`.
    pub fn intern_item(&mut self, field: usize, value: Value) -> CacheResult<usize> {
        self.require_state("extend a dictionary", ImportState::Open)?;
        let field = self
            .fields
            .get_mut(field)
            .ok_or(CacheError::UnknownField(field))?;
        Ok(field.intern(value))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[CacheField] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&CacheField> {
        self.fields.get(index)
    }

    /// Case-insensitive lookup by field name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name().to_lowercase() == name.to_lowercase())
    }

    /// Number of records written (and, once sealed, kept).
    pub fn row_count(&self) -> usize {
        self.records.logical_count()
    }

    /// Number of record slots currently allocated.
    pub fn capacity(&self) -> usize {
        self.records.capacity()
    }

    /// Inline values currently owned by the record store.
    pub fn inline_value_count(&self) -> usize {
        self.records.live_inline_values()
    }

    /// Bytes per record; 0 until import starts.
    pub fn record_size(&self) -> usize {
        self.records.record_size()
    }

    /// Decide field encodings, size the record store and start accepting values.
    ///
    /// Fails without side effects: on error the cache stays `Open` with no layout applied.
    pub fn begin_import(&mut self, expected_records: usize) -> CacheResult<()> {
        self.require_state("begin an import", ImportState::Open)?;

        let (layouts, record_size) = compute_layout(&self.fields)?;
        let inline_offsets = layouts
            .iter()
            .filter(|l| l.encoding == FieldEncoding::Inline)
            .map(|l| l.offset)
            .collect();
        let mut records = RecordStore::new(record_size, inline_offsets, self.options.growth_step);
        records.ensure_capacity(self.options.preallocation(expected_records))?;

        for (field, layout) in self.fields.iter_mut().zip(layouts) {
            field.apply_layout(layout);
        }
        self.records = records;
        self.state = ImportState::Importing;

        log::debug!(
            "pivot cache import started: {} fields, {} byte records, {} slots reserved",
            self.fields.len(),
            record_size,
            self.records.capacity()
        );
        Ok(())
    }

    /// Seal the cache, trimming storage to exactly `actual_records` slots.
    pub fn end_import(&mut self, actual_records: usize) -> CacheResult<()> {
        self.require_state("end an import", ImportState::Importing)?;
        self.records.trim(actual_records)?;
        self.state = ImportState::Sealed;
        log::debug!("pivot cache sealed with {actual_records} records");
        Ok(())
    }

    /// Discard everything written so far and return to `Open`.
    pub fn abort_import(&mut self) -> CacheResult<()> {
        self.require_state("abort an import", ImportState::Importing)?;
        self.records = RecordStore::new(0, Vec::new(), self.options.growth_step);
        for field in &mut self.fields {
            field.clear_layout();
        }
        self.state = ImportState::Open;
        log::debug!("pivot cache import aborted");
        Ok(())
    }

    /// Release every record of a sealed cache. Fields and layout are kept.
    pub fn truncate(&mut self) -> CacheResult<()> {
        self.require_state("truncate", ImportState::Sealed)?;
        let released = self.records.logical_count();
        self.records.clear();
        log::debug!("pivot cache truncated, {released} records released");
        Ok(())
    }

    /// Render records one per line, for debugging.
    ///
    /// `field_order` selects and orders the fields (all fields by default); `permutation` selects
    /// and orders the records (all records by default).
    pub fn dump(
        &self,
        field_order: Option<&[usize]>,
        permutation: Option<&[usize]>,
    ) -> CacheResult<String> {
        self.require_layout("dump")?;
        let all_fields: Vec<usize> = (0..self.fields.len()).collect();
        let field_order = field_order.unwrap_or(&all_fields);
        for &field in field_order {
            self.field_checked(field)?;
        }

        let mut out = String::new();
        let count = permutation.map_or(self.row_count(), <[usize]>::len);
        for iter in 0..count {
            let record = match permutation {
                Some(perm) => {
                    let _ = write!(out, "[{}]", perm[iter]);
                    perm[iter]
                }
                None => iter,
            };
            self.records.record(record)?;
            let _ = write!(out, "{})", iter + 1);

            for (j, &field) in field_order.iter().enumerate() {
                let f = &self.fields[field];
                let base = self.storage_field(f);
                let value = match base.encoding() {
                    FieldEncoding::Delegated => continue,
                    FieldEncoding::Inline => {
                        let _ = write!(out, "\t[{j}] ");
                        self.records.read_inline(record, base.offset())?
                    }
                    encoding => {
                        let stored = self.records.read_index(record, base.offset(), encoding)?;
                        if stored == 0 {
                            continue;
                        }
                        let position = stored as usize - 1;
                        let _ = write!(out, "\t({j}) {position}=");
                        base.dictionary().get(position)
                    }
                };

                if let Some(bucketer) = f.bucketer() {
                    let bucket = bucketer.apply(value);
                    let label = usize::try_from(bucket)
                        .ok()
                        .and_then(|b| f.grouped_items().get(b));
                    write_dump_value(&mut out, label);
                }
                write_dump_value(&mut out, value);
            }
            out.push('\n');
        }

        log::trace!("pivot cache dump:\n{out}");
        Ok(out)
    }

    pub(crate) fn require_state(
        &self,
        operation: &'static str,
        expected: ImportState,
    ) -> CacheResult<()> {
        if self.state != expected {
            return Err(CacheError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Reads need a layout, which exists from `begin_import` onwards.
    pub(crate) fn require_layout(&self, operation: &'static str) -> CacheResult<()> {
        if self.state == ImportState::Open {
            return Err(CacheError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    pub(crate) fn field_checked(&self, field: usize) -> CacheResult<&CacheField> {
        self.fields.get(field).ok_or(CacheError::UnknownField(field))
    }

    /// The field that actually owns storage for `field` (its group parent, if any).
    pub(crate) fn storage_field<'a>(&'a self, field: &'a CacheField) -> &'a CacheField {
        match field.group_parent() {
            Some(parent) => &self.fields[parent],
            None => field,
        }
    }
}

fn write_dump_value(out: &mut String, value: Option<&Value>) {
    match value {
        None => out.push_str("<MISSING>"),
        Some(v) => {
            let _ = write!(out, "'{v}'");
        }
    }
}
