//! Format independent representation of a single value.

use std::fmt::{self, Display, Formatter};

/// A decoded value of any [`DataType`](crate::DataType).
///
/// Integers of every width are widened to 64 bits and floats to `f64`; the owning type decides
/// how the value is narrowed again when it is stored in a column.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Null,
    UInt64(u64),
    Int64(i64),
    Float64(f64),
    String(String),
    Array(Vec<Field>),
    Tuple(Vec<Field>),
    Map(Vec<(Field, Field)>),
}

impl Field {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::UInt64(_) => "UInt64",
            Self::Int64(_) => "Int64",
            Self::Float64(_) => "Float64",
            Self::String(_) => "String",
            Self::Array(_) => "Array",
            Self::Tuple(_) => "Tuple",
            Self::Map(_) => "Map",
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fn list(f: &mut Formatter<'_>, items: &[Field]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{item}")?;
            }
            Ok(())
        }

        match self {
            Self::Null => write!(f, "NULL"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Array(items) => {
                write!(f, "[")?;
                list(f, items)?;
                write!(f, "]")
            }
            Self::Tuple(items) => {
                write!(f, "(")?;
                list(f, items)?;
                write!(f, ")")
            }
            Self::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for Field {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Field {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<u64> for Field {
    fn from(v: u64) -> Self {
        Self::UInt64(v)
    }
}

impl From<u32> for Field {
    fn from(v: u32) -> Self {
        Self::UInt64(v as u64)
    }
}

impl From<i64> for Field {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Field {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Field {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let field = Field::Tuple(vec![
            Field::from("a"),
            Field::Array(vec![Field::UInt64(1), Field::Null]),
            Field::Map(vec![(Field::from("k"), Field::Float64(1.5))]),
        ]);
        assert_eq!(field.to_string(), r#"("a", [1, NULL], {"k": 1.5})"#);
    }

    #[test]
    fn from_option() {
        assert_eq!(Field::from(None::<u64>), Field::Null);
        assert_eq!(Field::from(Some("x")), Field::String("x".into()));
    }
}
