//! Ordering of record indices by a list of sort fields.

use crate::bucketer::Bucketer;
use crate::cache::DataCache;
use crate::error::{CacheError, CacheResult};
use crate::field::{CacheField, FieldEncoding};
use crate::value::Value;
use std::cmp::Ordering;

/// Rank given to the "missing" sentinel so it sorts after every dictionary item.
const MISSING_RANK: u32 = u32::MAX;

/// One resolved sort field.
struct SortKey<'a> {
    storage: &'a CacheField,
    bucketer: Option<&'a Bucketer>,
    /// Rank of each stored index (`ranks[0]` is the missing sentinel) for indexed fields compared
    /// by value, so comparisons never touch the dictionary.
    ranks: Option<Vec<u32>>,
}

impl DataCache {
    /// Reorder `permutation` (record indices) by `field_order`, outermost field first.
    ///
    /// Fields with a group parent compare their parent's storage. Fields with a bucketer compare
    /// bucket ids instead of values. The sort is stable: records tied on every field keep their
    /// order in `permutation`. A record that cannot be read fails the call, and `permutation` is
    /// then left in an unspecified order.
    pub fn permute(&self, field_order: &[usize], permutation: &mut [usize]) -> CacheResult<()> {
        self.require_layout("permute records")?;

        let mut keys = Vec::with_capacity(field_order.len());
        for &field in field_order {
            let f = self.field_checked(field)?;
            let storage = self.storage_field(f);
            let bucketer = f.bucketer();
            let ranks = match bucketer {
                None if storage.encoding().is_indexed() => Some(dictionary_ranks(storage)),
                _ => None,
            };
            keys.push(SortKey {
                storage,
                bucketer,
                ranks,
            });
        }

        let rows = self.row_count();
        if let Some(&record) = permutation.iter().find(|&&r| r >= rows) {
            return Err(CacheError::RecordOutOfRange { record, len: rows });
        }

        let mut failure = None;
        permutation.sort_by(|&a, &b| {
            for key in &keys {
                match self.compare_key(key, a, b) {
                    Ok(Ordering::Equal) => {}
                    Ok(ord) => return ord,
                    Err(err) => {
                        if failure.is_none() {
                            failure = Some(err);
                        }
                        return Ordering::Equal;
                    }
                }
            }
            Ordering::Equal
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn compare_key(&self, key: &SortKey<'_>, a: usize, b: usize) -> CacheResult<Ordering> {
        let storage = key.storage;
        if let Some(ranks) = &key.ranks {
            let rank = |record| -> CacheResult<u32> {
                let stored = self
                    .records
                    .read_index(record, storage.offset(), storage.encoding())?;
                Ok(ranks[stored as usize])
            };
            return Ok(rank(a)?.cmp(&rank(b)?));
        }

        let va = self.storage_value(storage, a)?;
        let vb = self.storage_value(storage, b)?;
        Ok(match key.bucketer {
            Some(bucketer) => bucketer.apply(va).cmp(&bucketer.apply(vb)),
            None => Value::cmp_optional(va, vb),
        })
    }

    /// Value held by a storage-owning field.
    fn storage_value<'a>(&'a self, storage: &'a CacheField, record: usize) -> CacheResult<Option<&'a Value>> {
        match storage.encoding() {
            FieldEncoding::Inline => self.records.read_inline(record, storage.offset()),
            FieldEncoding::Delegated => self.records.record(record).map(|_| None),
            encoding => match self.records.read_index(record, storage.offset(), encoding)? {
                0 => Ok(None),
                stored => Ok(storage.dictionary().get(stored as usize - 1)),
            },
        }
    }
}

/// Map every stored index of `field` to its rank in value order.
fn dictionary_ranks(field: &CacheField) -> Vec<u32> {
    let items = field.dictionary().items();
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| items[a].total_cmp(&items[b]));

    let mut ranks = vec![MISSING_RANK; items.len() + 1];
    let mut rank = 0u32;
    for (i, &position) in order.iter().enumerate() {
        if i > 0 && items[order[i - 1]].total_cmp(&items[position]) != Ordering::Equal {
            rank += 1;
        }
        ranks[position + 1] = rank;
    }
    ranks
}
