//! Concrete data types.

pub mod array;
pub mod map;
pub mod nullable;
pub mod number;
pub mod string;
pub mod tuple;

pub use array::DataTypeArray;
pub use map::DataTypeMap;
pub use nullable::DataTypeNullable;
pub use number::{
    DataTypeFloat32, DataTypeFloat64, DataTypeInt8, DataTypeInt16, DataTypeInt32, DataTypeInt64,
    DataTypeNumber, DataTypeUInt8, DataTypeUInt16, DataTypeUInt32, DataTypeUInt64, NativeNumber,
};
pub use string::DataTypeString;
pub use tuple::DataTypeTuple;
