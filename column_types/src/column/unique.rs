//! Columns of distinct values with a reverse index for constant time deduplication.

use std::marker::PhantomData;
use std::sync::Arc;

use ahash::RandomState;
use hashbrown::HashMap;
use hashbrown::hash_table::{Entry, HashTable};

use crate::column::Column;
use crate::data_type::DataTypeRef;
use crate::error::{Error, Result};
use crate::field::Field;
use crate::string::PackedStringArray;
use crate::types::number::NativeNumber;

/// Maps numeric values to their position by bit pattern.
#[derive(Debug, Clone)]
pub struct NumberIndex<T> {
    positions: HashMap<u64, u64>,
    _marker: PhantomData<T>,
}

impl<T: NativeNumber> Default for NumberIndex<T> {
    fn default() -> Self {
        Self {
            positions: HashMap::new(),
            _marker: PhantomData,
        }
    }
}

impl<T: NativeNumber> NumberIndex<T> {
    fn lookup_or_insert(&mut self, keys: &mut Column, src: &Column, row: usize) -> Result<u64> {
        let value = T::values(src)
            .ok_or_else(|| Error::type_mismatch(T::NAME, src.name()))?[row];
        let keys_name = keys.name();
        let keys = T::values_mut(keys).ok_or_else(|| Error::type_mismatch(T::NAME, keys_name))?;
        let next = keys.len() as u64;
        Ok(*self.positions.entry(value.to_bits()).or_insert_with(|| {
            keys.push(value);
            next
        }))
    }

    fn clear(&mut self) {
        self.positions.clear()
    }
}

/// Deduplicates strings stored in a [`PackedStringArray`], holding only their ids.
#[derive(Debug, Clone)]
pub struct StringIndex {
    hash: RandomState,
    dedup: HashTable<u64>,
}

impl Default for StringIndex {
    fn default() -> Self {
        Self {
            hash: RandomState::new(),
            dedup: HashTable::new(),
        }
    }
}

impl StringIndex {
    fn lookup_or_insert(&mut self, storage: &mut PackedStringArray, value: &str) -> u64 {
        let hash = &self.hash;
        let hashed = hash.hash_one(value);
        let entry = self.dedup.entry(
            hashed,
            |&id| storage.get(id as usize) == Some(value),
            |&id| hash.hash_one(storage.get(id as usize).unwrap_or_default()),
        );
        match entry {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let id = storage.append(value) as u64;
                entry.insert(id);
                id
            }
        }
    }

    fn clear(&mut self) {
        self.dedup.clear()
    }
}

/// Deduplicates values of any type by their binary row encoding.
#[derive(Debug, Clone)]
pub struct GenericIndex {
    data_type: DataTypeRef,
    positions: HashMap<Vec<u8>, u64>,
}

impl GenericIndex {
    pub fn new(data_type: DataTypeRef) -> Self {
        Self {
            data_type,
            positions: HashMap::new(),
        }
    }

    fn lookup_or_insert(&mut self, keys: &mut Column, src: &Column, row: usize) -> Result<u64> {
        let mut encoded = Vec::new();
        self.data_type.serialize_binary(src, row, &mut encoded)?;
        if let Some(position) = self.positions.get(&encoded) {
            return Ok(*position);
        }
        let position = keys.len() as u64;
        keys.push_from(src, row)?;
        self.positions.insert(encoded, position);
        Ok(position)
    }

    fn clear(&mut self) {
        self.positions.clear()
    }
}

/// Reverse index specialization, selected by the kind of the (non-nullable) key type.
#[derive(Debug, Clone)]
pub enum ReverseIndex {
    UInt8(NumberIndex<u8>),
    UInt16(NumberIndex<u16>),
    UInt32(NumberIndex<u32>),
    UInt64(NumberIndex<u64>),
    Int8(NumberIndex<i8>),
    Int16(NumberIndex<i16>),
    Int32(NumberIndex<i32>),
    Int64(NumberIndex<i64>),
    Float32(NumberIndex<f32>),
    Float64(NumberIndex<f64>),
    String(StringIndex),
    Generic(GenericIndex),
}

impl ReverseIndex {
    /// Position of row `row` of `src` in `keys`, appending it to `keys` first if it is new.
    fn lookup_or_insert(&mut self, keys: &mut Column, src: &Column, row: usize) -> Result<u64> {
        match self {
            Self::UInt8(index) => index.lookup_or_insert(keys, src, row),
            Self::UInt16(index) => index.lookup_or_insert(keys, src, row),
            Self::UInt32(index) => index.lookup_or_insert(keys, src, row),
            Self::UInt64(index) => index.lookup_or_insert(keys, src, row),
            Self::Int8(index) => index.lookup_or_insert(keys, src, row),
            Self::Int16(index) => index.lookup_or_insert(keys, src, row),
            Self::Int32(index) => index.lookup_or_insert(keys, src, row),
            Self::Int64(index) => index.lookup_or_insert(keys, src, row),
            Self::Float32(index) => index.lookup_or_insert(keys, src, row),
            Self::Float64(index) => index.lookup_or_insert(keys, src, row),
            Self::String(index) => match (keys, src) {
                (Column::String(storage), Column::String(values)) => {
                    let value = values.get(row).ok_or_else(|| {
                        Error::serialization(format!("row {row} out of bounds"))
                    })?;
                    Ok(index.lookup_or_insert(storage, value))
                }
                (_, src) => Err(Error::type_mismatch("String", src.name())),
            },
            Self::Generic(index) => index.lookup_or_insert(keys, src, row),
        }
    }

    fn clear(&mut self) {
        match self {
            Self::UInt8(index) => index.clear(),
            Self::UInt16(index) => index.clear(),
            Self::UInt32(index) => index.clear(),
            Self::UInt64(index) => index.clear(),
            Self::Int8(index) => index.clear(),
            Self::Int16(index) => index.clear(),
            Self::Int32(index) => index.clear(),
            Self::Int64(index) => index.clear(),
            Self::Float32(index) => index.clear(),
            Self::Float64(index) => index.clear(),
            Self::String(index) => index.clear(),
            Self::Generic(index) => index.clear(),
        }
    }

    pub fn kind(&self) -> &'static str {
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
            Self::Generic(_) => "Generic",
        }
    }
}

/// A column holding each distinct value of its key type exactly once.
///
/// Values are numbered by first insertion. If the key type is nullable, null takes its own
/// position the first time it is inserted.
#[derive(Debug, Clone)]
pub struct ColumnUnique {
    keys_type: DataTypeRef,
    keys: Box<Column>,
    null_position: Option<u64>,
    index: ReverseIndex,
}

impl ColumnUnique {
    /// An empty unique column. `index` must match the key type with any nullable wrapper
    /// removed.
    pub fn new(keys_type: DataTypeRef, index: ReverseIndex) -> Self {
        let keys = Box::new(keys_type.create_column());
        Self {
            keys_type,
            keys,
            null_position: None,
            index,
        }
    }

    pub fn keys_type(&self) -> &DataTypeRef {
        &self.keys_type
    }

    /// The distinct values, in position order.
    pub fn keys(&self) -> &Column {
        self.keys.as_ref()
    }

    pub fn index(&self) -> &ReverseIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn is_nullable(&self) -> bool {
        matches!(*self.keys, Column::Nullable { .. })
    }

    pub fn value_at(&self, position: u64) -> Field {
        self.keys.field_at(position as usize)
    }

    /// Insert row `row` of `src`, a column of the key type, returning its position.
    pub fn insert_from(&mut self, src: &Column, row: usize) -> Result<u64> {
        match (self.keys.as_mut(), src) {
            (
                Column::Nullable { null_map, nested },
                Column::Nullable {
                    null_map: src_null_map,
                    nested: src_nested,
                },
            ) => {
                if src_null_map[row] != 0 {
                    return self.insert_null();
                }
                let before = nested.len();
                let position = self.index.lookup_or_insert(nested, src_nested, row)?;
                if nested.len() > before {
                    null_map.push(0);
                }
                Ok(position)
            }
            (Column::Nullable { null_map, nested }, src) => {
                let before = nested.len();
                let position = self.index.lookup_or_insert(nested, src, row)?;
                if nested.len() > before {
                    null_map.push(0);
                }
                Ok(position)
            }
            (keys, src) => self.index.lookup_or_insert(keys, src, row),
        }
    }

    fn insert_null(&mut self) -> Result<u64> {
        if let Some(position) = self.null_position {
            return Ok(position);
        }
        let Column::Nullable { null_map, nested } = self.keys.as_mut() else {
            return Err(Error::type_mismatch(self.keys_type.name(), "Null"));
        };
        let position = null_map.len() as u64;
        nested.push_default()?;
        null_map.push(1);
        self.null_position = Some(position);
        Ok(position)
    }

    /// Insert a single value, returning its position.
    pub fn insert_field(&mut self, field: &Field) -> Result<u64> {
        if field.is_null() {
            return self.insert_null();
        }
        let mut value = self.keys.empty_like();
        value.push_field(field)?;
        self.insert_from(&value, 0)
    }

    /// Insert `len` rows of `src` starting at `start`, returning their positions.
    pub fn insert_range_from(&mut self, src: &Column, start: usize, len: usize) -> Result<Vec<u64>> {
        (start..start + len)
            .map(|row| self.insert_from(src, row))
            .collect()
    }

    /// Remove every value, keeping the key type and index kind.
    pub fn clear(&mut self) {
        self.keys = Box::new(self.keys.empty_like());
        self.null_position = None;
        self.index.clear();
    }

    /// An empty column with the same key type and index kind.
    pub fn cloned_empty(&self) -> Self {
        let mut index = self.index.clone();
        index.clear();
        Self {
            keys_type: Arc::clone(&self.keys_type),
            keys: Box::new(self.keys.empty_like()),
            null_position: None,
            index,
        }
    }
}

impl PartialEq for ColumnUnique {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::types::nullable::DataTypeNullable;
    use crate::types::number::DataTypeFloat64;
    use crate::types::string::DataTypeString;

    fn strings(values: &[&str]) -> Column {
        Column::String(values.iter().copied().collect())
    }

    #[test]
    fn strings_keep_first_occurrence_order() {
        let mut unique = ColumnUnique::new(
            Arc::new(DataTypeString::new()),
            ReverseIndex::String(StringIndex::default()),
        );
        let src = strings(&["b", "a", "b", "c", "a"]);
        let positions = unique.insert_range_from(&src, 0, src.len()).unwrap();
        assert_eq!(positions, vec![0, 1, 0, 2, 1]);
        assert_eq!(unique.keys(), &strings(&["b", "a", "c"]));
    }

    #[test]
    fn nullable_keys() {
        let keys_type = Arc::new(DataTypeNullable::new(Arc::new(DataTypeFloat64::new())).unwrap());
        let mut unique = ColumnUnique::new(keys_type, ReverseIndex::Float64(NumberIndex::default()));

        assert_eq!(unique.insert_field(&Field::Float64(1.5)).unwrap(), 0);
        assert_eq!(unique.insert_field(&Field::Null).unwrap(), 1);
        assert_eq!(unique.insert_field(&Field::Null).unwrap(), 1);
        assert_eq!(unique.insert_field(&Field::Float64(1.5)).unwrap(), 0);
        assert_eq!(unique.insert_field(&Field::Float64(f64::NAN)).unwrap(), 2);
        assert_eq!(unique.insert_field(&Field::Float64(f64::NAN)).unwrap(), 2);

        assert_eq!(unique.len(), 3);
        assert_eq!(unique.value_at(1), Field::Null);

        unique.clear();
        assert!(unique.is_empty());
        assert_eq!(unique.insert_field(&Field::Null).unwrap(), 0);
    }

    #[test]
    fn index_mismatch() {
        let mut unique = ColumnUnique::new(
            Arc::new(DataTypeString::new()),
            ReverseIndex::String(StringIndex::default()),
        );
        let err = unique.insert_from(&Column::UInt8(vec![1]), 0).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn cloned_empty_keeps_key_type() {
        let mut unique = ColumnUnique::new(
            Arc::new(DataTypeString::new()),
            ReverseIndex::String(StringIndex::default()),
        );
        unique.insert_field(&Field::from("a")).unwrap();
        unique.insert_field(&Field::from("b")).unwrap();

        let mut empty = unique.cloned_empty();
        assert!(empty.is_empty());
        assert!(!empty.is_nullable());
        assert_eq!(empty.keys(), &strings(&[]));
        assert_eq!(empty.index().kind(), "String");
        assert_eq!(empty.insert_field(&Field::from("b")).unwrap(), 0);
        assert_eq!(unique.len(), 2);
    }
}
