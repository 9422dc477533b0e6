//! Locating and removing dictionary encoding inside nested types and columns.
//!
//! The type walks and the column walks visit children in the same order, so a column built for
//! a type can be rewritten alongside it.

use std::borrow::Cow;
use std::sync::Arc;

use column_types::column::ColumnLowCardinality;
use column_types::types::{DataTypeArray, DataTypeMap, DataTypeTuple};
use column_types::{Column, DataType, DataTypeRef, Error, Result, TypeNode};

use crate::unique::create_column_unique;

/// The dictionary type of a `LowCardinality` type, any other type unchanged.
pub fn remove_low_cardinality(data_type: &DataTypeRef) -> DataTypeRef {
    match data_type.node() {
        TypeNode::LowCardinality(dictionary_type) => Arc::clone(dictionary_type),
        _ => Arc::clone(data_type),
    }
}

/// `data_type` with every `LowCardinality` wrapper, at any depth, replaced by its dictionary
/// type. Returns the same instance if there is nothing to remove.
pub fn recursive_remove_low_cardinality(data_type: &DataTypeRef) -> DataTypeRef {
    match data_type.node() {
        TypeNode::Leaf | TypeNode::Nullable(_) => Arc::clone(data_type),
        TypeNode::LowCardinality(dictionary_type) => {
            recursive_remove_low_cardinality(dictionary_type)
        }
        TypeNode::Array(nested) => {
            let stripped = recursive_remove_low_cardinality(nested);
            if Arc::ptr_eq(&stripped, nested) {
                return Arc::clone(data_type);
            }
            Arc::new(DataTypeArray::new(stripped))
        }
        TypeNode::Tuple { elements, .. } => {
            let stripped: Vec<_> = elements
                .iter()
                .map(recursive_remove_low_cardinality)
                .collect();
            if stripped.iter().zip(elements).all(|(s, e)| Arc::ptr_eq(s, e)) {
                return Arc::clone(data_type);
            }
            match data_type.downcast_ref::<DataTypeTuple>() {
                Some(tuple) => Arc::new(tuple.with_elements(stripped)),
                None => Arc::clone(data_type),
            }
        }
        TypeNode::Map { key, value } => {
            let stripped_key = recursive_remove_low_cardinality(key);
            let stripped_value = recursive_remove_low_cardinality(value);
            if Arc::ptr_eq(&stripped_key, key) && Arc::ptr_eq(&stripped_value, value) {
                return Arc::clone(data_type);
            }
            Arc::new(DataTypeMap::new(stripped_key, stripped_value))
        }
    }
}

/// `column` with every dictionary encoded column, at any depth, expanded into a plain column.
/// Borrows `column` if it holds no dictionary encoded column.
pub fn recursive_remove_low_cardinality_column(column: &Column) -> Result<Cow<'_, Column>> {
    Ok(match column {
        Column::LowCardinality(lc) => {
            let full = lc.convert_to_full_column()?;
            Cow::Owned(recursive_remove_low_cardinality_column(&full)?.into_owned())
        }
        Column::Nullable { null_map, nested } => {
            match recursive_remove_low_cardinality_column(nested)? {
                Cow::Borrowed(_) => Cow::Borrowed(column),
                Cow::Owned(nested) => Cow::Owned(Column::Nullable {
                    null_map: null_map.clone(),
                    nested: Box::new(nested),
                }),
            }
        }
        Column::Array { offsets, values } => {
            match recursive_remove_low_cardinality_column(values)? {
                Cow::Borrowed(_) => Cow::Borrowed(column),
                Cow::Owned(values) => Cow::Owned(Column::Array {
                    offsets: offsets.clone(),
                    values: Box::new(values),
                }),
            }
        }
        Column::Tuple(columns) => {
            let stripped = columns
                .iter()
                .map(recursive_remove_low_cardinality_column)
                .collect::<Result<Vec<_>>>()?;
            if stripped.iter().all(|c| matches!(c, Cow::Borrowed(_))) {
                Cow::Borrowed(column)
            } else {
                Cow::Owned(Column::Tuple(
                    stripped.into_iter().map(Cow::into_owned).collect(),
                ))
            }
        }
        Column::Map(nested) => match recursive_remove_low_cardinality_column(nested)? {
            Cow::Borrowed(_) => Cow::Borrowed(column),
            Cow::Owned(nested) => Cow::Owned(Column::Map(Box::new(nested))),
        },
        _ => Cow::Borrowed(column),
    })
}

/// Rewrite `column`, built for `from_type`, to the dictionary encoding placement of `to_type`.
///
/// Both types must be equal once every `LowCardinality` wrapper is removed. Encodings are
/// added where only `to_type` has them and expanded where only `from_type` has them.
pub fn recursive_low_cardinality_conversion<'a>(
    column: &'a Column,
    from_type: &DataTypeRef,
    to_type: &DataTypeRef,
) -> Result<Cow<'a, Column>> {
    if from_type.equals(to_type.as_ref()) {
        return Ok(Cow::Borrowed(column));
    }
    let from_plain = recursive_remove_low_cardinality(from_type);
    let to_plain = recursive_remove_low_cardinality(to_type);
    if !from_plain.equals(to_plain.as_ref()) {
        return Err(Error::type_mismatch(to_type.name(), from_type.name()));
    }
    convert(column, from_type, to_type)
}

fn convert<'a>(
    column: &'a Column,
    from_type: &DataTypeRef,
    to_type: &DataTypeRef,
) -> Result<Cow<'a, Column>> {
    if from_type.equals(to_type.as_ref()) {
        return Ok(Cow::Borrowed(column));
    }
    let mismatch = || Error::type_mismatch(from_type.name(), column.name());

    match (from_type.node(), to_type.node()) {
        (TypeNode::LowCardinality(from_dictionary), _) => {
            let lc = column.as_low_cardinality().ok_or_else(mismatch)?;
            let full = lc.convert_to_full_column()?;
            Ok(Cow::Owned(
                convert(&full, from_dictionary, to_type)?.into_owned(),
            ))
        }
        (_, TypeNode::LowCardinality(to_dictionary)) => {
            let values = convert(column, from_type, to_dictionary)?;
            let mut lc = ColumnLowCardinality::new(create_column_unique(to_dictionary));
            lc.insert_range_from_full(&values, 0, values.len())?;
            Ok(Cow::Owned(Column::LowCardinality(lc)))
        }
        (TypeNode::Nullable(from_nested), TypeNode::Nullable(to_nested)) => {
            let Column::Nullable { null_map, nested } = column else {
                return Err(mismatch());
            };
            Ok(match convert(nested, from_nested, to_nested)? {
                Cow::Borrowed(_) => Cow::Borrowed(column),
                Cow::Owned(nested) => Cow::Owned(Column::Nullable {
                    null_map: null_map.clone(),
                    nested: Box::new(nested),
                }),
            })
        }
        (TypeNode::Array(from_nested), TypeNode::Array(to_nested)) => {
            let Column::Array { offsets, values } = column else {
                return Err(mismatch());
            };
            Ok(match convert(values, from_nested, to_nested)? {
                Cow::Borrowed(_) => Cow::Borrowed(column),
                Cow::Owned(values) => Cow::Owned(Column::Array {
                    offsets: offsets.clone(),
                    values: Box::new(values),
                }),
            })
        }
        (
            TypeNode::Tuple {
                elements: from_elements,
                ..
            },
            TypeNode::Tuple {
                elements: to_elements,
                ..
            },
        ) => {
            let Column::Tuple(columns) = column else {
                return Err(mismatch());
            };
            if columns.len() != from_elements.len() || columns.len() != to_elements.len() {
                return Err(mismatch());
            }
            let converted = columns
                .iter()
                .zip(from_elements.iter().zip(to_elements))
                .map(|(c, (from, to))| convert(c, from, to))
                .collect::<Result<Vec<_>>>()?;
            if converted.iter().all(|c| matches!(c, Cow::Borrowed(_))) {
                return Ok(Cow::Borrowed(column));
            }
            Ok(Cow::Owned(Column::Tuple(
                converted.into_iter().map(Cow::into_owned).collect(),
            )))
        }
        (TypeNode::Map { .. }, TypeNode::Map { .. }) => {
            let Column::Map(nested) = column else {
                return Err(mismatch());
            };
            let (Some(from_map), Some(to_map)) = (
                from_type.downcast_ref::<DataTypeMap>(),
                to_type.downcast_ref::<DataTypeMap>(),
            ) else {
                return Err(mismatch());
            };
            Ok(match convert(nested, from_map.nested(), to_map.nested())? {
                Cow::Borrowed(_) => Cow::Borrowed(column),
                Cow::Owned(nested) => Cow::Owned(Column::Map(Box::new(nested))),
            })
        }
        _ => Err(Error::type_mismatch(to_type.name(), from_type.name())),
    }
}
