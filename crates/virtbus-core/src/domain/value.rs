//! Dynamic bus values
//!
//! [`BusValue`] is the tagged representation of a D-Bus value as it crosses
//! the adapter boundary. Typed code never sees it: signal arguments and
//! method replies are converted with [`FromBusValue`], and a shape mismatch
//! yields `None` rather than a panic.

use std::collections::HashMap;

use super::newtypes::ObjectPath;

/// One D-Bus value
#[derive(Debug, Clone, PartialEq)]
pub enum BusValue {
    Bool(bool),
    Byte(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    ObjectPath(ObjectPath),
    /// A type signature value (`g`)
    Signature(String),
    Array(Vec<BusValue>),
    /// Byte array (`ay`); keeps its element type when empty
    Bytes(Vec<u8>),
    /// Dictionary entries in wire order
    Dict(Vec<(BusValue, BusValue)>),
    Struct(Vec<BusValue>),
    /// A value wrapped in a variant (`v`)
    Variant(Box<BusValue>),
}

impl BusValue {
    /// Short type tag for log messages
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            BusValue::Bool(_) => "bool",
            BusValue::Byte(_) => "byte",
            BusValue::I16(_) => "int16",
            BusValue::U16(_) => "uint16",
            BusValue::I32(_) => "int32",
            BusValue::U32(_) => "uint32",
            BusValue::I64(_) => "int64",
            BusValue::U64(_) => "uint64",
            BusValue::F64(_) => "double",
            BusValue::Str(_) => "string",
            BusValue::ObjectPath(_) => "object_path",
            BusValue::Signature(_) => "signature",
            BusValue::Array(_) => "array",
            BusValue::Bytes(_) => "bytes",
            BusValue::Dict(_) => "dict",
            BusValue::Struct(_) => "struct",
            BusValue::Variant(_) => "variant",
        }
    }

    /// Strips any number of variant wrappers
    #[must_use]
    pub fn peel(&self) -> &BusValue {
        let mut value = self;
        while let BusValue::Variant(inner) = value {
            value = inner;
        }
        value
    }

    /// Converts into `T`, `None` on shape mismatch
    pub fn decode<T: FromBusValue>(&self) -> Option<T> {
        T::from_bus_value(self)
    }
}

// ============================================================================
// FromBusValue
// ============================================================================

/// Conversion from a [`BusValue`] into a typed Rust value
///
/// Conversions are strict: an `int32` does not decode as `u32` and a
/// variant is only unwrapped where the target type is itself dynamic
/// (`BusValue`) or a dictionary of variants.
pub trait FromBusValue: Sized {
    /// Returns `None` when the value does not have the expected shape
    fn from_bus_value(value: &BusValue) -> Option<Self>;
}

macro_rules! scalar_from_bus_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromBusValue for $ty {
                fn from_bus_value(value: &BusValue) -> Option<Self> {
                    match value {
                        BusValue::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for BusValue {
                fn from(v: $ty) -> Self {
                    BusValue::$variant(v)
                }
            }
        )*
    };
}

scalar_from_bus_value! {
    bool => Bool,
    u8 => Byte,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f64 => F64,
    String => Str,
    ObjectPath => ObjectPath,
}

impl From<&str> for BusValue {
    fn from(v: &str) -> Self {
        BusValue::Str(v.to_string())
    }
}

impl<T: Into<BusValue>> From<Vec<T>> for BusValue {
    fn from(items: Vec<T>) -> Self {
        BusValue::Array(items.into_iter().map(Into::into).collect())
    }
}

impl FromBusValue for BusValue {
    fn from_bus_value(value: &BusValue) -> Option<Self> {
        Some(value.peel().clone())
    }
}

impl<T: FromBusValue> FromBusValue for Vec<T> {
    fn from_bus_value(value: &BusValue) -> Option<Self> {
        match value {
            BusValue::Array(items) => items.iter().map(T::from_bus_value).collect(),
            BusValue::Bytes(bytes) => bytes
                .iter()
                .map(|b| T::from_bus_value(&BusValue::Byte(*b)))
                .collect(),
            _ => None,
        }
    }
}

/// `a{sv}` style dictionaries; variant wrappers on values are removed
impl FromBusValue for HashMap<String, BusValue> {
    fn from_bus_value(value: &BusValue) -> Option<Self> {
        match value {
            BusValue::Dict(entries) => entries
                .iter()
                .map(|(k, v)| Some((String::from_bus_value(k)?, v.peel().clone())))
                .collect(),
            _ => None,
        }
    }
}

macro_rules! tuple_from_bus_value {
    ($len:literal; $($name:ident),+) => {
        impl<$($name: FromBusValue),+> FromBusValue for ($($name,)+) {
            fn from_bus_value(value: &BusValue) -> Option<Self> {
                match value {
                    BusValue::Struct(fields) if fields.len() == $len => {
                        let mut fields = fields.iter();
                        Some(($($name::from_bus_value(fields.next()?)?,)+))
                    }
                    _ => None,
                }
            }
        }
    };
}

tuple_from_bus_value!(2; A, B);
tuple_from_bus_value!(3; A, B, C);
tuple_from_bus_value!(4; A, B, C, D);
