//! Construction of the unique column backing a dictionary.

use std::sync::Arc;

use column_types::column::unique::{GenericIndex, NumberIndex, StringIndex};
use column_types::{Column, ColumnUnique, DataTypeRef, Result, ReverseIndex, TypeIndex, TypeNode};

/// An empty unique column for keys of `keys_type`.
///
/// The reverse index is chosen by the kind of `keys_type` with any `Nullable` wrapper removed:
/// numbers are indexed by bit pattern, strings by content and everything else by the binary
/// encoding of the value.
pub fn create_column_unique(keys_type: &DataTypeRef) -> ColumnUnique {
    let values_type = match keys_type.node() {
        TypeNode::Nullable(nested) => nested,
        _ => keys_type,
    };
    let index = match values_type.type_index() {
        TypeIndex::UInt8 => ReverseIndex::UInt8(NumberIndex::default()),
        TypeIndex::UInt16 => ReverseIndex::UInt16(NumberIndex::default()),
        TypeIndex::UInt32 => ReverseIndex::UInt32(NumberIndex::default()),
        TypeIndex::UInt64 => ReverseIndex::UInt64(NumberIndex::default()),
        TypeIndex::Int8 => ReverseIndex::Int8(NumberIndex::default()),
        TypeIndex::Int16 => ReverseIndex::Int16(NumberIndex::default()),
        TypeIndex::Int32 => ReverseIndex::Int32(NumberIndex::default()),
        TypeIndex::Int64 => ReverseIndex::Int64(NumberIndex::default()),
        TypeIndex::Float32 => ReverseIndex::Float32(NumberIndex::default()),
        TypeIndex::Float64 => ReverseIndex::Float64(NumberIndex::default()),
        TypeIndex::String => ReverseIndex::String(StringIndex::default()),
        TypeIndex::Nullable
        | TypeIndex::Array
        | TypeIndex::Tuple
        | TypeIndex::Map
        | TypeIndex::LowCardinality => {
            ReverseIndex::Generic(GenericIndex::new(Arc::clone(values_type)))
        }
    };
    ColumnUnique::new(Arc::clone(keys_type), index)
}

/// A unique column seeded with the values of `keys`, a column of `keys_type`, together with the
/// position of every row of `keys`. Positions follow the first occurrence of each value.
pub fn create_column_unique_from(
    keys_type: &DataTypeRef,
    keys: &Column,
) -> Result<(ColumnUnique, Vec<u64>)> {
    let keys = keys.to_full_column()?;
    let mut unique = create_column_unique(keys_type);
    let positions = unique.insert_range_from(&keys, 0, keys.len())?;
    Ok((unique, positions))
}
