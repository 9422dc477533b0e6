//! Builds type descriptors from their names, e.g. `Array(Nullable(String))`.

use std::sync::Arc;

use hashbrown::HashMap;
use tracing::trace;

use crate::data_type::DataTypeRef;
use crate::error::{Error, Result};
use crate::types::{
    DataTypeArray, DataTypeFloat32, DataTypeFloat64, DataTypeInt8, DataTypeInt16, DataTypeInt32,
    DataTypeInt64, DataTypeMap, DataTypeNullable, DataTypeString, DataTypeTuple, DataTypeUInt8,
    DataTypeUInt16, DataTypeUInt32, DataTypeUInt64,
};

/// One parsed argument of a parametric type, optionally preceded by a name (`id UInt32`).
#[derive(Debug, Clone)]
pub struct TypeArgument {
    pub name: Option<String>,
    pub data_type: DataTypeRef,
}

/// Creates a type of one family from its parsed arguments.
pub type TypeCreator = fn(Vec<TypeArgument>) -> Result<DataTypeRef>;

/// Registry of type families.
#[derive(Debug, Clone)]
pub struct DataTypeFactory {
    families: HashMap<&'static str, TypeCreator>,
}

impl Default for DataTypeFactory {
    /// A factory with every built in family registered.
    fn default() -> Self {
        let mut factory = Self::empty();
        factory.register("UInt8", |args| simple(args, "UInt8", DataTypeUInt8::new));
        factory.register("UInt16", |args| simple(args, "UInt16", DataTypeUInt16::new));
        factory.register("UInt32", |args| simple(args, "UInt32", DataTypeUInt32::new));
        factory.register("UInt64", |args| simple(args, "UInt64", DataTypeUInt64::new));
        factory.register("Int8", |args| simple(args, "Int8", DataTypeInt8::new));
        factory.register("Int16", |args| simple(args, "Int16", DataTypeInt16::new));
        factory.register("Int32", |args| simple(args, "Int32", DataTypeInt32::new));
        factory.register("Int64", |args| simple(args, "Int64", DataTypeInt64::new));
        factory.register("Float32", |args| simple(args, "Float32", DataTypeFloat32::new));
        factory.register("Float64", |args| simple(args, "Float64", DataTypeFloat64::new));
        factory.register("String", |args| simple(args, "String", DataTypeString::new));
        factory.register("Nullable", create_nullable);
        factory.register("Array", create_array);
        factory.register("Tuple", create_tuple);
        factory.register("Map", create_map);
        factory
    }
}

impl DataTypeFactory {
    /// A factory with no families registered.
    pub fn empty() -> Self {
        Self {
            families: HashMap::new(),
        }
    }

    /// Register (or replace) the creator for `family`.
    pub fn register(&mut self, family: &'static str, creator: TypeCreator) {
        trace!(family, "registering data type family");
        self.families.insert(family, creator);
    }

    pub fn is_registered(&self, family: &str) -> bool {
        self.families.contains_key(family)
    }

    /// Parse `name` and build the described type.
    pub fn get(&self, name: &str) -> Result<DataTypeRef> {
        let mut parser = Parser {
            factory: self,
            input: name,
            pos: 0,
        };
        let data_type = parser.parse_type()?;
        parser.skip_whitespace();
        if parser.pos != name.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(data_type)
    }

    /// Build a type of `family` from already constructed arguments.
    pub fn create(&self, family: &str, args: Vec<TypeArgument>) -> Result<DataTypeRef> {
        let creator = self
            .families
            .get(family)
            .ok_or_else(|| Error::UnknownType {
                name: family.to_string(),
            })?;
        creator(args)
    }
}

/// Recursive descent over `Family`, `Family(arg, ...)` and `name Family` arguments.
#[derive(Debug)]
struct Parser<'a> {
    factory: &'a DataTypeFactory,
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse_type(&mut self) -> Result<DataTypeRef> {
        self.skip_whitespace();
        let family = self.parse_identifier()?;
        self.skip_whitespace();
        let args = if self.consume(b'(') {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        self.factory.create(family, args)
    }

    fn parse_arguments(&mut self) -> Result<Vec<TypeArgument>> {
        let mut args = Vec::new();
        loop {
            args.push(self.parse_argument()?);
            self.skip_whitespace();
            if self.consume(b')') {
                return Ok(args);
            }
            if !self.consume(b',') {
                return Err(self.error("expected ',' or ')'"));
            }
        }
    }

    fn parse_argument(&mut self) -> Result<TypeArgument> {
        self.skip_whitespace();
        let start = self.pos;
        let first = self.parse_identifier()?;
        let after_first = self.pos;
        self.skip_whitespace();
        if self.pos > after_first && self.peek().is_some_and(is_identifier_start) {
            let data_type = self.parse_type()?;
            return Ok(TypeArgument {
                name: Some(first.to_string()),
                data_type,
            });
        }
        self.pos = start;
        Ok(TypeArgument {
            name: None,
            data_type: self.parse_type()?,
        })
    }

    fn parse_identifier(&mut self) -> Result<&'a str> {
        let start = self.pos;
        if !self.peek().is_some_and(is_identifier_start) {
            return Err(self.error("expected a type name"));
        }
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        Ok(&self.input[start..self.pos])
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn consume(&mut self, byte: u8) -> bool {
        let found = self.peek() == Some(byte);
        if found {
            self.pos += 1;
        }
        found
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn error(&self, reason: &str) -> Error {
        Error::construction(self.input, format!("{reason} at offset {}", self.pos))
    }
}

fn is_identifier_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn simple<T>(args: Vec<TypeArgument>, family: &str, new: fn() -> T) -> Result<DataTypeRef>
where
    T: crate::data_type::DataType,
{
    if !args.is_empty() {
        return Err(Error::construction(family, "takes no arguments"));
    }
    Ok(Arc::new(new()))
}

/// The single unnamed argument of `family`.
pub fn single_argument(family: &str, args: Vec<TypeArgument>) -> Result<DataTypeRef> {
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (
            Some(TypeArgument {
                name: None,
                data_type,
            }),
            None,
        ) => Ok(data_type),
        _ => Err(Error::construction(
            family,
            "expects exactly one unnamed type argument",
        )),
    }
}

fn create_nullable(args: Vec<TypeArgument>) -> Result<DataTypeRef> {
    let nested = single_argument("Nullable", args)?;
    Ok(Arc::new(DataTypeNullable::new(nested)?))
}

fn create_array(args: Vec<TypeArgument>) -> Result<DataTypeRef> {
    let nested = single_argument("Array", args)?;
    Ok(Arc::new(DataTypeArray::new(nested)))
}

fn create_tuple(args: Vec<TypeArgument>) -> Result<DataTypeRef> {
    let named = args.iter().filter(|a| a.name.is_some()).count();
    if named == 0 {
        let elements = args.into_iter().map(|a| a.data_type).collect();
        return Ok(Arc::new(DataTypeTuple::new(elements)?));
    }
    if named != args.len() {
        return Err(Error::construction(
            "Tuple",
            "either all or none of the elements must be named",
        ));
    }
    let (names, elements): (Vec<String>, Vec<DataTypeRef>) = args
        .into_iter()
        .map(|a| (a.name.unwrap_or_default(), a.data_type))
        .unzip();
    Ok(Arc::new(DataTypeTuple::with_names(elements, names)?))
}

fn create_map(args: Vec<TypeArgument>) -> Result<DataTypeRef> {
    match <[TypeArgument; 2]>::try_from(args) {
        Ok([key, value]) if key.name.is_none() && value.name.is_none() => {
            Ok(Arc::new(DataTypeMap::new(key.data_type, value.data_type)))
        }
        _ => Err(Error::construction(
            "Map",
            "expects exactly two unnamed type arguments",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::TypeIndex;

    #[test]
    fn round_trips_names() {
        let factory = DataTypeFactory::default();
        for name in [
            "UInt8",
            "Float64",
            "Nullable(String)",
            "Array(Array(Int32))",
            "Tuple(UInt8, String)",
            "Tuple(id UInt32, tags Array(String))",
            "Map(String, Nullable(UInt64))",
        ] {
            assert_eq!(factory.get(name).unwrap().name(), name);
        }
    }

    #[test]
    fn tolerates_whitespace() {
        let factory = DataTypeFactory::default();
        let data_type = factory.get(" Array ( Nullable( Int8 ) ) ").unwrap();
        assert_eq!(data_type.name(), "Array(Nullable(Int8))");
        assert_eq!(data_type.type_index(), TypeIndex::Array);
    }

    #[test]
    fn errors() {
        let factory = DataTypeFactory::default();
        assert!(matches!(
            factory.get("Decimal(String)").unwrap_err(),
            Error::UnknownType { name } if name == "Decimal"
        ));
        for name in [
            "",
            "Array(",
            "Array(String",
            "Array(String) x",
            "UInt8(String)",
            "Array(String, String)",
            "Nullable(Array(String))",
            "Map(String)",
            "Tuple(a UInt8, String)",
            "Tuple(a UInt8, a String)",
        ] {
            assert!(
                matches!(factory.get(name), Err(Error::Construction { .. })),
                "{name}"
            );
        }
    }

    #[test]
    fn custom_family() {
        let mut factory = DataTypeFactory::empty();
        assert!(!factory.is_registered("Text"));
        factory.register("Text", |args| {
            single_argument("Text", args).map(|_| Arc::new(DataTypeString::new()) as DataTypeRef)
        });
        factory.register("String", |_| Ok(Arc::new(DataTypeString::new()) as DataTypeRef));
        assert_eq!(factory.get("Text(String)").unwrap().name(), "String");
    }
}
