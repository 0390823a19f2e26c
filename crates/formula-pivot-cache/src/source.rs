//! Import driver: sources push cells into the cache through an [`ImportSink`].

use crate::cache::{DataCache, ImportState};
use crate::error::{CacheError, CacheResult};
use crate::field::{CacheField, FieldEncoding};
use crate::value::Value;

/// A push-only producer of records.
pub trait CacheSource {
    /// Row count used to pre-size storage. It may be an estimate.
    fn expected_records(&self) -> usize;

    /// Deliver every cell to `sink` and return the number of records produced.
    fn push_records(&mut self, sink: &mut ImportSink<'_>) -> CacheResult<usize>;
}

/// Write access to a cache for the duration of an import.
pub struct ImportSink<'a> {
    cache: &'a mut DataCache,
}

impl ImportSink<'_> {
    pub fn field_count(&self) -> usize {
        self.cache.field_count()
    }

    pub fn field(&self, index: usize) -> Option<&CacheField> {
        self.cache.field(index)
    }

    /// Store one cell, resolving indexed fields through their dictionary. `None` stores "missing".
    pub fn deliver(&mut self, field: usize, record: usize, value: Option<Value>) -> CacheResult<()> {
        let f = self.cache.field_checked(field)?;
        match (f.encoding(), value) {
            (FieldEncoding::Delegated, _) => Err(CacheError::WrongCodec {
                field,
                encoding: FieldEncoding::Delegated,
                operation: "deliver a value",
            }),
            (_, None) => self.cache.clear_value(field, record),
            (FieldEncoding::Inline, Some(value)) => self.cache.set_value(field, record, value),
            (_, Some(value)) => {
                let position = f.dictionary().position(&value).ok_or_else(|| {
                    CacheError::ValueNotInDictionary {
                        field,
                        value: value.display_string(),
                    }
                })?;
                self.cache.set_index(field, record, position)
            }
        }
    }

    /// Store a dictionary position the source already resolved.
    pub fn deliver_index(&mut self, field: usize, record: usize, position: usize) -> CacheResult<()> {
        self.cache.set_index(field, record, position)
    }
}

impl DataCache {
    /// Run a full import from `source`: layout, fill, seal.
    ///
    /// If the source fails (or delivers fewer records than it reports) the import is aborted and
    /// the cache returns to `Open` with no records.
    pub fn import<S: CacheSource + ?Sized>(&mut self, source: &mut S) -> CacheResult<usize> {
        self.begin_import(source.expected_records())?;

        let pushed = {
            let mut sink = ImportSink { cache: &mut *self };
            source.push_records(&mut sink)
        };
        let result = pushed.and_then(|count| self.end_import(count).map(|()| count));
        if let Err(err) = &result {
            log::debug!("pivot cache import failed: {err}");
            if self.state() == ImportState::Importing {
                self.abort_import()?;
            }
        }
        result
    }
}

/// Rows of values held in memory, e.g. a worksheet range.
///
/// Column `c` of every row is delivered to field `columns[c]`; by default column `c` maps to
/// field `c`.
#[derive(Debug, Clone, Default)]
pub struct RowSource {
    columns: Option<Vec<usize>>,
    rows: Vec<Vec<Option<Value>>>,
}

impl RowSource {
    pub fn new(rows: Vec<Vec<Option<Value>>>) -> Self {
        Self {
            columns: None,
            rows,
        }
    }

    pub fn with_columns(mut self, columns: Vec<usize>) -> Self {
        self.columns = Some(columns);
        self
    }

    fn field_for_column(&self, column: usize) -> CacheResult<usize> {
        match &self.columns {
            Some(columns) => columns
                .get(column)
                .copied()
                .ok_or(CacheError::UnknownField(column)),
            None => Ok(column),
        }
    }
}

impl CacheSource for RowSource {
    fn expected_records(&self) -> usize {
        self.rows.len()
    }

    fn push_records(&mut self, sink: &mut ImportSink<'_>) -> CacheResult<usize> {
        for (record, row) in self.rows.iter().enumerate() {
            for (column, value) in row.iter().enumerate() {
                let field = self.field_for_column(column)?;
                sink.deliver(field, record, value.clone())?;
            }
        }
        Ok(self.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::CacheField;
    use pretty_assertions::assert_eq;

    fn cache() -> DataCache {
        let mut cache = DataCache::new();
        cache.add_field(CacheField::new("name")).unwrap();
        cache
            .add_field(CacheField::new("region").with_dictionary(["East", "West"].map(Value::from)))
            .unwrap();
        cache
    }

    #[test]
    fn row_source_resolves_dictionary_values() {
        let mut cache = cache();
        let mut source = RowSource::new(vec![
            vec![Some(Value::text("a")), Some(Value::text("West"))],
            vec![None, Some(Value::text("East"))],
            vec![Some(Value::text("c")), None],
        ]);

        assert_eq!(cache.import(&mut source).unwrap(), 3);
        assert_eq!(cache.state(), ImportState::Sealed);
        assert_eq!(cache.row_count(), 3);
        assert_eq!(cache.capacity(), 3);

        let regions: Vec<_> = (0..3).map(|r| cache.get_index(1, r).unwrap()).collect();
        assert_eq!(regions, vec![Some(1), Some(0), None]);
        assert_eq!(cache.get_value(0, 1).unwrap(), None);
    }

    #[test]
    fn unknown_dictionary_value_aborts_the_import() {
        let mut cache = cache();
        let mut source = RowSource::new(vec![
            vec![Some(Value::text("a")), Some(Value::text("East"))],
            vec![Some(Value::text("b")), Some(Value::text("South"))],
        ]);

        let err = cache.import(&mut source).unwrap_err();
        assert_eq!(
            err,
            CacheError::ValueNotInDictionary {
                field: 1,
                value: "South".to_string()
            }
        );
        assert_eq!(cache.state(), ImportState::Open);
        assert_eq!(cache.row_count(), 0);
        assert_eq!(cache.field(1).unwrap().encoding(), FieldEncoding::Delegated);

        // The cache is reusable once the dictionary is fixed.
        cache.intern_item(1, Value::text("South")).unwrap();
        assert_eq!(cache.import(&mut source).unwrap(), 2);
        assert_eq!(cache.get_value(1, 1).unwrap(), Some(&Value::text("South")));
    }

    #[test]
    fn column_mapping_skips_delegated_fields() {
        let mut cache = cache();
        cache
            .add_field(CacheField::new("region group").with_group_parent(1))
            .unwrap();
        cache.add_field(CacheField::new("amount")).unwrap();

        let mut source = RowSource::new(vec![vec![
            Some(Value::text("a")),
            Some(Value::text("East")),
            Some(Value::number(4.0)),
        ]])
        .with_columns(vec![0, 1, 3]);
        cache.import(&mut source).unwrap();

        assert_eq!(cache.get_value(2, 0).unwrap(), Some(&Value::text("East")));
        assert_eq!(cache.get_value(3, 0).unwrap(), Some(&Value::number(4.0)));

        let mut sink_cache = DataCache::new();
        sink_cache.add_field(CacheField::new("a")).unwrap();
        sink_cache
            .add_field(CacheField::new("b").with_group_parent(0))
            .unwrap();
        let mut direct = RowSource::new(vec![vec![None, Some(Value::number(1.0))]]);
        assert!(matches!(
            sink_cache.import(&mut direct),
            Err(CacheError::WrongCodec {
                field: 1,
                encoding: FieldEncoding::Delegated,
                ..
            })
        ));
    }

    struct ShortSource;

    impl CacheSource for ShortSource {
        fn expected_records(&self) -> usize {
            10
        }

        fn push_records(&mut self, sink: &mut ImportSink<'_>) -> CacheResult<usize> {
            sink.deliver_index(1, 0, 1)?;
            // Claims more records than were written.
            Ok(5)
        }
    }

    #[test]
    fn over_reported_record_count_is_rejected() {
        let mut cache = cache();
        assert_eq!(
            cache.import(&mut ShortSource),
            Err(CacheError::TrimBeyondWritten {
                requested: 5,
                written: 1
            })
        );
        assert_eq!(cache.state(), ImportState::Open);
    }
}
