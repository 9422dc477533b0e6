//! Dictionary encoded (`LowCardinality`) columns.
//!
//! [`DataTypeLowCardinality`] wraps any [`DataType`](column_types::DataType), the dictionary
//! type, and stores columns of it as a dictionary of unique values plus one position per row.
//! Values, names and row encodings are those of the dictionary type; only the physical column
//! and the bulk stream layout (see [`bulk`]) differ.
//!
//! [`recursive`] strips or moves the wrapper inside nested types and their columns, and
//! [`factory`] makes the family available to type name parsing.

pub mod bulk;
pub mod data_type;
pub mod factory;
pub mod recursive;
pub mod unique;

pub use data_type::DataTypeLowCardinality;
pub use factory::{data_type_factory, register};
pub use recursive::{
    recursive_low_cardinality_conversion, recursive_remove_low_cardinality,
    recursive_remove_low_cardinality_column, remove_low_cardinality,
};
pub use unique::{create_column_unique, create_column_unique_from};
