use crate::bucketer::Bucketer;
use crate::error::{CacheError, CacheResult};
use crate::records::INLINE_SLOT_WIDTH;
use crate::value::{Value, ValueKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Largest dictionary addressable by an 8-bit slot (0 is reserved for "missing").
pub const MAX_INDEXED8_ITEMS: usize = (1 << 8) - 2;
/// Largest dictionary addressable by a 16-bit slot (0 is reserved for "missing").
pub const MAX_INDEXED16_ITEMS: usize = (1 << 16) - 2;
const MAX_INDEXED32_ITEMS: usize = u32::MAX as usize - 1;

/// How a field's value is encoded inside each record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldEncoding {
    /// No storage; the value comes from the field's group parent.
    #[default]
    Delegated,
    /// A handle to a value owned by the record store.
    Inline,
    Indexed8,
    Indexed16,
    Indexed32,
}

impl FieldEncoding {
    /// Pick the narrowest indexed encoding able to address `items` dictionary entries.
    pub fn for_dictionary_len(items: usize) -> Option<FieldEncoding> {
        match items {
            0 => None,
            n if n <= MAX_INDEXED8_ITEMS => Some(FieldEncoding::Indexed8),
            n if n <= MAX_INDEXED16_ITEMS => Some(FieldEncoding::Indexed16),
            n if n <= MAX_INDEXED32_ITEMS => Some(FieldEncoding::Indexed32),
            _ => None,
        }
    }

    /// Bytes occupied in every record.
    pub fn width(&self) -> usize {
        match self {
            FieldEncoding::Delegated => 0,
            FieldEncoding::Inline => INLINE_SLOT_WIDTH,
            FieldEncoding::Indexed8 => 1,
            FieldEncoding::Indexed16 => 2,
            FieldEncoding::Indexed32 => 4,
        }
    }

    pub fn is_indexed(&self) -> bool {
        matches!(
            self,
            FieldEncoding::Indexed8 | FieldEncoding::Indexed16 | FieldEncoding::Indexed32
        )
    }
}

/// Ordered distinct values of an indexed field, with a reverse lookup.
#[derive(Debug, Clone, Default)]
pub struct FieldDictionary {
    items: Vec<Value>,
    lookup: HashMap<ValueKey, usize>,
}

impl FieldDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the position of `value`, appending it if it is new.
    pub fn intern(&mut self, value: Value) -> usize {
        let key = value.key();
        if let Some(&idx) = self.lookup.get(&key) {
            return idx;
        }
        let idx = self.items.len();
        self.items.push(value);
        self.lookup.insert(key, idx);
        idx
    }

    pub fn position(&self, value: &Value) -> Option<usize> {
        self.lookup.get(&value.key()).copied()
    }

    pub fn get(&self, position: usize) -> Option<&Value> {
        self.items.get(position)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }
}

impl FromIterator<Value> for FieldDictionary {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let mut dict = FieldDictionary::new();
        for value in iter {
            dict.intern(value);
        }
        dict
    }
}

/// One column of a [`crate::DataCache`].
#[derive(Debug, Clone, Default)]
pub struct CacheField {
    name: String,
    index: Option<usize>,
    encoding: FieldEncoding,
    offset: usize,
    dictionary: FieldDictionary,
    grouped_items: Vec<Value>,
    group_parent: Option<usize>,
    bucketer: Option<Bucketer>,
}

impl CacheField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Shared items for an indexed field. Duplicates collapse onto their first occurrence.
    pub fn with_dictionary(mut self, items: impl IntoIterator<Item = Value>) -> Self {
        for item in items {
            self.dictionary.intern(item);
        }
        self
    }

    pub fn with_group_parent(mut self, parent: usize) -> Self {
        self.group_parent = Some(parent);
        self
    }

    pub fn with_bucketer(mut self, bucketer: Bucketer) -> CacheResult<Self> {
        bucketer.validate()?;
        self.bucketer = Some(bucketer);
        Ok(self)
    }

    /// Labels for the bucket ids produced by the field's bucketer (`grouped_items[id]`).
    pub fn with_grouped_items(mut self, items: impl IntoIterator<Item = Value>) -> Self {
        self.grouped_items = items.into_iter().collect();
        self
    }

    pub fn intern(&mut self, value: Value) -> usize {
        self.dictionary.intern(value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position within the owning cache; `None` until registered.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Encoding chosen at import start. `Delegated` before layout.
    pub fn encoding(&self) -> FieldEncoding {
        self.encoding
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn dictionary(&self) -> &FieldDictionary {
        &self.dictionary
    }

    pub fn grouped_items(&self) -> &[Value] {
        &self.grouped_items
    }

    pub fn group_parent(&self) -> Option<usize> {
        self.group_parent
    }

    pub fn bucketer(&self) -> Option<&Bucketer> {
        self.bucketer.as_ref()
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = Some(index);
    }

    pub(crate) fn apply_layout(&mut self, layout: FieldLayout) {
        self.encoding = layout.encoding;
        self.offset = layout.offset;
    }

    pub(crate) fn clear_layout(&mut self) {
        self.encoding = FieldEncoding::Delegated;
        self.offset = 0;
    }
}

/// Encoding and byte offset decided for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldLayout {
    pub encoding: FieldEncoding,
    pub offset: usize,
}

/// Decide every field's encoding and offset, returning the layouts and the record size.
///
/// Nothing is written back to the fields, so a failure leaves them untouched.
pub(crate) fn compute_layout(fields: &[CacheField]) -> CacheResult<(Vec<FieldLayout>, usize)> {
    let mut layouts: Vec<FieldLayout> = Vec::with_capacity(fields.len());
    let mut offset = 0usize;

    for (idx, field) in fields.iter().enumerate() {
        if let Some(parent) = field.group_parent {
            let invalid = |reason| CacheError::InvalidGroupParent {
                field: idx,
                parent,
                reason,
            };
            if parent == idx {
                return Err(invalid("a field cannot group itself"));
            }
            if parent >= fields.len() {
                return Err(invalid("parent is not registered"));
            }
            let Some(base) = layouts.get(parent) else {
                return Err(invalid("parent must be registered before its children"));
            };
            if base.encoding == FieldEncoding::Delegated {
                return Err(invalid("parent has no storage of its own"));
            }
            layouts.push(FieldLayout {
                encoding: FieldEncoding::Delegated,
                offset: base.offset,
            });
            continue;
        }

        let encoding = match field.dictionary.len() {
            0 => FieldEncoding::Inline,
            len => FieldEncoding::for_dictionary_len(len)
                .ok_or(CacheError::DictionaryTooLarge { field: idx, len })?,
        };
        layouts.push(FieldLayout { encoding, offset });
        offset += encoding.width();
    }

    Ok((layouts, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> impl Iterator<Item = Value> {
        (0..n).map(|i| Value::number(i as f64))
    }

    #[test]
    fn dictionary_size_selects_narrowest_width() {
        assert_eq!(FieldEncoding::for_dictionary_len(1), Some(FieldEncoding::Indexed8));
        assert_eq!(FieldEncoding::for_dictionary_len(254), Some(FieldEncoding::Indexed8));
        assert_eq!(FieldEncoding::for_dictionary_len(255), Some(FieldEncoding::Indexed16));
        assert_eq!(FieldEncoding::for_dictionary_len(65_534), Some(FieldEncoding::Indexed16));
        assert_eq!(FieldEncoding::for_dictionary_len(65_535), Some(FieldEncoding::Indexed32));
        assert_eq!(FieldEncoding::for_dictionary_len(0), None);
    }

    #[test]
    fn offsets_are_a_running_sum_skipping_delegated_fields() {
        let fields = vec![
            CacheField::new("name"),
            CacheField::new("region").with_dictionary(numbered(3)),
            CacheField::new("region group").with_group_parent(1),
            CacheField::new("id").with_dictionary(numbered(300)),
        ];
        let (layouts, record_size) = compute_layout(&fields).unwrap();

        let encodings: Vec<_> = layouts.iter().map(|l| l.encoding).collect();
        assert_eq!(
            encodings,
            vec![
                FieldEncoding::Inline,
                FieldEncoding::Indexed8,
                FieldEncoding::Delegated,
                FieldEncoding::Indexed16,
            ]
        );
        let offsets: Vec<_> = layouts.iter().map(|l| l.offset).collect();
        assert_eq!(offsets, vec![0, INLINE_SLOT_WIDTH, INLINE_SLOT_WIDTH, INLINE_SLOT_WIDTH + 1]);
        assert_eq!(record_size, INLINE_SLOT_WIDTH + 1 + 2);
    }

    #[test]
    fn group_parent_must_precede_and_own_storage() {
        let forward = vec![CacheField::new("child").with_group_parent(1), CacheField::new("p")];
        assert!(matches!(
            compute_layout(&forward),
            Err(CacheError::InvalidGroupParent { field: 0, parent: 1, .. })
        ));

        let chained = vec![
            CacheField::new("a"),
            CacheField::new("b").with_group_parent(0),
            CacheField::new("c").with_group_parent(1),
        ];
        assert!(matches!(
            compute_layout(&chained),
            Err(CacheError::InvalidGroupParent { field: 2, parent: 1, .. })
        ));

        let own = vec![CacheField::new("a").with_group_parent(0)];
        assert!(compute_layout(&own).is_err());
    }

    #[test]
    fn dictionary_dedupes_by_value_identity() {
        let dict: FieldDictionary = ["East", "West", "East"].into_iter().map(Value::from).collect();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.position(&Value::text("West")), Some(1));
        assert_eq!(dict.position(&Value::text("North")), None);
    }
}
