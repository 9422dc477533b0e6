//! Registration of the `LowCardinality` family with a [`DataTypeFactory`].

use std::sync::Arc;

use column_types::factory::single_argument;
use column_types::{DataTypeFactory, DataTypeRef, Result, TypeArgument};

use crate::DataTypeLowCardinality;

pub const FAMILY_NAME: &str = "LowCardinality";

/// Register `LowCardinality(T)` with `factory`. The family takes exactly one unnamed argument.
pub fn register(factory: &mut DataTypeFactory) {
    factory.register(FAMILY_NAME, create);
}

/// A factory with the built in families and `LowCardinality`.
pub fn data_type_factory() -> DataTypeFactory {
    let mut factory = DataTypeFactory::default();
    register(&mut factory);
    factory
}

fn create(args: Vec<TypeArgument>) -> Result<DataTypeRef> {
    let dictionary_type = single_argument(FAMILY_NAME, args)?;
    Ok(Arc::new(DataTypeLowCardinality::new(dictionary_type)?))
}

#[cfg(test)]
mod tests {
    use column_types::{Error, TypeIndex};

    use super::*;

    #[test]
    fn parses_nested_names() {
        let factory = data_type_factory();
        for name in [
            "LowCardinality(String)",
            "LowCardinality(Nullable(String))",
            "Array(LowCardinality(Nullable(String)))",
            "Map(LowCardinality(String), UInt64)",
            "Tuple(tag LowCardinality(String), value Float64)",
            "LowCardinality(Array(UInt8))",
        ] {
            assert_eq!(factory.get(name).unwrap().name(), name);
        }
        assert_eq!(
            factory.get("LowCardinality(UInt32)").unwrap().type_index(),
            TypeIndex::LowCardinality
        );
    }

    #[test]
    fn argument_errors() {
        let factory = data_type_factory();
        for name in [
            "LowCardinality",
            "LowCardinality(String, String)",
            "LowCardinality(x String)",
            "LowCardinality(LowCardinality(String))",
        ] {
            assert!(
                matches!(factory.get(name), Err(Error::Construction { .. })),
                "{name}"
            );
        }
    }

    #[test]
    fn unregistered_by_default() {
        let factory = DataTypeFactory::default();
        assert!(!factory.is_registered(FAMILY_NAME));
        assert!(matches!(
            factory.get("LowCardinality(String)"),
            Err(Error::UnknownType { .. })
        ));
    }
}
