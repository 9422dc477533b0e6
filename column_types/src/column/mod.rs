//! In-memory columns.

use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::field::Field;
use crate::string::PackedStringArray;
use crate::types::number::NativeNumber;

pub mod low_cardinality;
pub mod unique;

pub use low_cardinality::{ColumnLowCardinality, Positions};
pub use unique::{ColumnUnique, ReverseIndex};

/// A mutable, typed column of values.
///
/// The layout of each variant mirrors the stream layout of the owning type: nullable columns
/// keep a byte per row null map next to the values, arrays keep cumulative end offsets into a
/// flattened values column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    String(PackedStringArray),
    Nullable {
        /// Non-zero for null rows.
        null_map: Vec<u8>,
        /// Holds a default value at null rows.
        nested: Box<Column>,
    },
    Array {
        /// End offset of each row in `values`.
        offsets: Vec<u64>,
        values: Box<Column>,
    },
    Tuple(Vec<Column>),
    /// An `Array(Tuple(keys, values))` column.
    Map(Box<Column>),
    LowCardinality(ColumnLowCardinality),
}

/// Expands `$body` once per numeric variant with `$values` bound to the typed vector.
macro_rules! match_numeric {
    ($column:expr, $values:ident => $body:expr, $($rest:pat => $arm:expr),+ $(,)?) => {
        match $column {
            Column::UInt8($values) => $body,
            Column::UInt16($values) => $body,
            Column::UInt32($values) => $body,
            Column::UInt64($values) => $body,
            Column::Int8($values) => $body,
            Column::Int16($values) => $body,
            Column::Int32($values) => $body,
            Column::Int64($values) => $body,
            Column::Float32($values) => $body,
            Column::Float64($values) => $body,
            $($rest => $arm),+
        }
    };
}

fn empty_numeric<T: NativeNumber>(_: &[T]) -> Column {
    T::into_column(Vec::new())
}

fn push_numeric_field<T: NativeNumber>(values: &mut Vec<T>, field: &Field) -> Result<()> {
    values.push(T::from_field(field)?);
    Ok(())
}

fn push_numeric<T: NativeNumber>(values: &mut Vec<T>, src: &Column, row: usize) -> Result<()> {
    let src = T::values(src).ok_or_else(|| Error::type_mismatch(T::NAME, src.name()))?;
    values.push(src[row]);
    Ok(())
}

impl Column {
    /// Name of the variant, used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UInt8(_) => "UInt8",
            Self::UInt16(_) => "UInt16",
            Self::UInt32(_) => "UInt32",
            Self::UInt64(_) => "UInt64",
            Self::Int8(_) => "Int8",
            Self::Int16(_) => "Int16",
            Self::Int32(_) => "Int32",
            Self::Int64(_) => "Int64",
            Self::Float32(_) => "Float32",
            Self::Float64(_) => "Float64",
            Self::String(_) => "String",
            Self::Nullable { .. } => "Nullable",
            Self::Array { .. } => "Array",
            Self::Tuple(_) => "Tuple",
            Self::Map(_) => "Map",
            Self::LowCardinality(_) => "LowCardinality",
        }
    }

    pub fn len(&self) -> usize {
        match_numeric!(self, v => v.len(),
            Self::String(v) => v.len(),
            Self::Nullable { null_map, .. } => null_map.len(),
            Self::Array { offsets, .. } => offsets.len(),
            Self::Tuple(columns) => columns.first().map_or(0, Self::len),
            Self::Map(nested) => nested.len(),
            Self::LowCardinality(lc) => lc.len(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A column of the same type and shape with no rows.
    pub fn empty_like(&self) -> Self {
        match_numeric!(self, v => empty_numeric(v),
            Self::String(_) => Self::String(PackedStringArray::new()),
            Self::Nullable { nested, .. } => Self::Nullable {
                null_map: Vec::new(),
                nested: Box::new(nested.empty_like()),
            },
            Self::Array { values, .. } => Self::Array {
                offsets: Vec::new(),
                values: Box::new(values.empty_like()),
            },
            Self::Tuple(columns) => Self::Tuple(columns.iter().map(Self::empty_like).collect()),
            Self::Map(nested) => Self::Map(Box::new(nested.empty_like())),
            Self::LowCardinality(lc) => Self::LowCardinality(lc.empty_like()),
        )
    }

    /// Row range `[start, end)` of the values of array row `row`.
    pub fn array_range(offsets: &[u64], row: usize) -> (usize, usize) {
        let start = if row == 0 { 0 } else { offsets[row - 1] as usize };
        (start, offsets[row] as usize)
    }

    /// The value at `row`.
    ///
    /// # Panics
    ///
    /// If `row` is out of bounds.
    pub fn field_at(&self, row: usize) -> Field {
        match_numeric!(self, v => v[row].to_field(),
            Self::String(v) => Field::String(
                v.get(row)
                    .unwrap_or_else(|| panic!("row {row} out of bounds"))
                    .to_string(),
            ),
            Self::Nullable { null_map, nested } => {
                if null_map[row] != 0 {
                    Field::Null
                } else {
                    nested.field_at(row)
                }
            },
            Self::Array { offsets, values } => {
                let (start, end) = Self::array_range(offsets, row);
                Field::Array((start..end).map(|i| values.field_at(i)).collect())
            },
            Self::Tuple(columns) => Field::Tuple(columns.iter().map(|c| c.field_at(row)).collect()),
            Self::Map(nested) => match nested.field_at(row) {
                Field::Array(entries) => Field::Map(
                    entries
                        .into_iter()
                        .map(|entry| match entry {
                            Field::Tuple(mut kv) if kv.len() == 2 => {
                                let value = kv.pop().unwrap_or(Field::Null);
                                let key = kv.pop().unwrap_or(Field::Null);
                                (key, value)
                            }
                            other => (other, Field::Null),
                        })
                        .collect(),
                ),
                other => other,
            },
            Self::LowCardinality(lc) => lc.field_at(row),
        )
    }

    pub fn to_fields(&self) -> Vec<Field> {
        (0..self.len()).map(|row| self.field_at(row)).collect()
    }

    /// Append `field`, converting it to the column's native representation.
    pub fn push_field(&mut self, field: &Field) -> Result<()> {
        match_numeric!(self, v => push_numeric_field(v, field),
            Self::String(v) => match field {
                Field::String(s) => {
                    v.append(s);
                    Ok(())
                }
                other => Err(Error::type_mismatch("String", other.kind())),
            },
            Self::Nullable { null_map, nested } => {
                if field.is_null() {
                    nested.push_default()?;
                    null_map.push(1);
                } else {
                    nested.push_field(field)?;
                    null_map.push(0);
                }
                Ok(())
            },
            Self::Array { offsets, values } => {
                let Field::Array(items) = field else {
                    return Err(Error::type_mismatch("Array", field.kind()));
                };
                for item in items {
                    values.push_field(item)?;
                }
                offsets.push(values.len() as u64);
                Ok(())
            },
            Self::Tuple(columns) => match field {
                Field::Tuple(items) if items.len() == columns.len() => {
                    for (column, item) in columns.iter_mut().zip(items) {
                        column.push_field(item)?;
                    }
                    Ok(())
                }
                Field::Tuple(items) => Err(Error::type_mismatch(
                    format!("Tuple of {} elements", columns.len()),
                    format!("Tuple of {} elements", items.len()),
                )),
                other => Err(Error::type_mismatch("Tuple", other.kind())),
            },
            Self::Map(nested) => {
                let Field::Map(entries) = field else {
                    return Err(Error::type_mismatch("Map", field.kind()));
                };
                nested.push_field(&Field::Array(
                    entries
                        .iter()
                        .map(|(k, v)| Field::Tuple(vec![k.clone(), v.clone()]))
                        .collect(),
                ))
            },
            Self::LowCardinality(lc) => lc.insert_field(field),
        )
    }

    /// Append the default value of the column's type.
    pub fn push_default(&mut self) -> Result<()> {
        match_numeric!(self, v => {
            v.push(Default::default());
            Ok(())
        },
            Self::String(v) => {
                v.append("");
                Ok(())
            },
            Self::Nullable { null_map, nested } => {
                nested.push_default()?;
                null_map.push(1);
                Ok(())
            },
            Self::Array { offsets, values } => {
                offsets.push(values.len() as u64);
                Ok(())
            },
            Self::Tuple(columns) => columns.iter_mut().try_for_each(Self::push_default),
            Self::Map(nested) => nested.push_default(),
            Self::LowCardinality(lc) => lc.push_default(),
        )
    }

    /// Append row `row` of `src`, which must hold values of the same type. Dictionary encoded
    /// sources and destinations are converted as needed.
    pub fn push_from(&mut self, src: &Self, row: usize) -> Result<()> {
        if let Self::LowCardinality(src) = src {
            if !matches!(self, Self::LowCardinality(_)) {
                return self.push_from(src.dictionary().keys(), src.index_at(row) as usize);
            }
        }

        match_numeric!(self, v => push_numeric(v, src, row),
            Self::String(v) => {
                let Self::String(src) = src else {
                    return Err(Error::type_mismatch("String", src.name()));
                };
                v.append(src.get(row).unwrap_or_default());
                Ok(())
            },
            Self::Nullable { null_map, nested } => match src {
                Self::Nullable {
                    null_map: src_null_map,
                    nested: src_nested,
                } => {
                    nested.push_from(src_nested, row)?;
                    null_map.push(src_null_map[row]);
                    Ok(())
                }
                // a non-nullable value of the nested type
                other => {
                    nested.push_from(other, row)?;
                    null_map.push(0);
                    Ok(())
                }
            },
            Self::Array { offsets, values } => {
                let Self::Array {
                    offsets: src_offsets,
                    values: src_values,
                } = src
                else {
                    return Err(Error::type_mismatch("Array", src.name()));
                };
                let (start, end) = Self::array_range(src_offsets, row);
                for i in start..end {
                    values.push_from(src_values, i)?;
                }
                offsets.push(values.len() as u64);
                Ok(())
            },
            Self::Tuple(columns) => match src {
                Self::Tuple(src_columns) if src_columns.len() == columns.len() => {
                    for (column, src_column) in columns.iter_mut().zip(src_columns) {
                        column.push_from(src_column, row)?;
                    }
                    Ok(())
                }
                _ => Err(Error::type_mismatch("Tuple", src.name())),
            },
            Self::Map(nested) => match src {
                Self::Map(src_nested) => nested.push_from(src_nested, row),
                _ => Err(Error::type_mismatch("Map", src.name())),
            },
            Self::LowCardinality(lc) => match src {
                Self::LowCardinality(src) => lc.push_from_low_cardinality(src, row),
                full => lc.insert_from_full(full, row),
            },
        )
    }

    /// Append `len` rows of `src` starting at `start`.
    pub fn extend_from(&mut self, src: &Self, start: usize, len: usize) -> Result<()> {
        for row in start..start + len {
            self.push_from(src, row)?;
        }
        Ok(())
    }

    /// A new column with the given rows of this one, in order.
    pub fn take(&self, rows: impl IntoIterator<Item = usize>) -> Result<Self> {
        let mut out = self.empty_like();
        for row in rows {
            out.push_from(self, row)?;
        }
        Ok(out)
    }

    /// Rows `[offset, offset + len)` as a new column.
    pub fn slice(&self, offset: usize, len: usize) -> Result<Self> {
        self.take(offset..offset + len)
    }

    pub fn as_low_cardinality(&self) -> Option<&ColumnLowCardinality> {
        match self {
            Self::LowCardinality(lc) => Some(lc),
            _ => None,
        }
    }

    pub fn as_low_cardinality_mut(&mut self) -> Option<&mut ColumnLowCardinality> {
        match self {
            Self::LowCardinality(lc) => Some(lc),
            _ => None,
        }
    }

    /// The column with a top level dictionary encoding expanded. Nested encodings are kept.
    pub fn to_full_column(&self) -> Result<Cow<'_, Self>> {
        match self {
            Self::LowCardinality(lc) => Ok(Cow::Owned(lc.convert_to_full_column()?)),
            other => Ok(Cow::Borrowed(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn strings(values: &[&str]) -> Column {
        Column::String(values.iter().copied().collect())
    }

    #[test]
    fn nullable_fields() {
        let mut column = Column::Nullable {
            null_map: Vec::new(),
            nested: Box::new(Column::UInt32(Vec::new())),
        };
        column.push_field(&Field::UInt64(3)).unwrap();
        column.push_field(&Field::Null).unwrap();

        assert_eq!(column.to_fields(), vec![Field::UInt64(3), Field::Null]);
        assert_eq!(
            column,
            Column::Nullable {
                null_map: vec![0, 1],
                nested: Box::new(Column::UInt32(vec![3, 0])),
            }
        );
    }

    #[test]
    fn array_offsets() {
        let mut column = Column::Array {
            offsets: Vec::new(),
            values: Box::new(strings(&[])),
        };
        column
            .push_field(&Field::Array(vec!["a".into(), "b".into()]))
            .unwrap();
        column.push_field(&Field::Array(vec![])).unwrap();
        column.push_field(&Field::Array(vec!["c".into()])).unwrap();

        let Column::Array { offsets, .. } = &column else {
            unreachable!()
        };
        assert_eq!(offsets, &[2, 2, 3]);
        assert_eq!(column.field_at(2), Field::Array(vec!["c".into()]));

        let taken = column.take([2, 0]).unwrap();
        assert_eq!(
            taken.to_fields(),
            vec![
                Field::Array(vec!["c".into()]),
                Field::Array(vec!["a".into(), "b".into()]),
            ]
        );
    }

    #[test]
    fn map_fields() {
        let mut column = Column::Map(Box::new(Column::Array {
            offsets: Vec::new(),
            values: Box::new(Column::Tuple(vec![strings(&[]), Column::UInt8(Vec::new())])),
        }));
        let value = Field::Map(vec![("k".into(), Field::UInt64(1))]);
        column.push_field(&value).unwrap();
        assert_eq!(column.len(), 1);
        assert_eq!(column.field_at(0), value);
    }

    #[test]
    fn mismatched_push() {
        let mut column = strings(&[]);
        let err = column.push_from(&Column::UInt8(vec![1]), 0).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));

        let mut tuple = Column::Tuple(vec![Column::UInt8(Vec::new())]);
        assert!(
            tuple
                .push_field(&Field::Tuple(vec![Field::UInt64(1), Field::UInt64(2)]))
                .is_err()
        );
    }
}
