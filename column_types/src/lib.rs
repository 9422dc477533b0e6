//! The column type system dictionary encoded columns plug into.
//!
//! A [`DataType`] describes a column type: its name, the [`TypeTraits`] the engine queries, the
//! physical [`Column`] it creates, and how single values and whole columns are encoded. Row
//! formats are selected through [`RowFormat`]; whole columns are written to and read from a set
//! of named byte streams through the bulk protocol in [`bulk`].
//!
//! Types are built either directly (`DataTypeArray::new(...)`) or from their textual names with a
//! [`DataTypeFactory`].

pub mod bulk;
pub mod column;
pub mod data_type;
pub mod error;
pub mod factory;
pub mod field;
pub mod format;
pub mod io;
pub mod string;
pub mod text;
pub mod types;

pub use column::{Column, ColumnLowCardinality, ColumnUnique, Positions, ReverseIndex};
pub use data_type::{DataType, DataTypeRef, TypeIndex, TypeNode, TypeTraits};
pub use error::{Error, Result};
pub use factory::{DataTypeFactory, TypeArgument};
pub use field::Field;
pub use format::{FormatSettings, RowFormat};
