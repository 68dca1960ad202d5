//! Conversion between `zvariant` values and [`BusValue`]

use virtbus_core::domain::{BusError, BusValue, ObjectPath};
use zbus::zvariant::{self, Array, Dict, Signature, StructureBuilder, Value};

/// Converts one wire value
///
/// File descriptors and any other type without a [`BusValue`] counterpart
/// are rejected.
pub fn from_value(value: &Value<'_>) -> Result<BusValue, BusError> {
    Ok(match value {
        Value::Bool(v) => BusValue::Bool(*v),
        Value::U8(v) => BusValue::Byte(*v),
        Value::I16(v) => BusValue::I16(*v),
        Value::U16(v) => BusValue::U16(*v),
        Value::I32(v) => BusValue::I32(*v),
        Value::U32(v) => BusValue::U32(*v),
        Value::I64(v) => BusValue::I64(*v),
        Value::U64(v) => BusValue::U64(*v),
        Value::F64(v) => BusValue::F64(*v),
        Value::Str(s) => BusValue::Str(s.as_str().to_string()),
        Value::Signature(s) => BusValue::Signature(s.as_str().to_string()),
        Value::ObjectPath(p) => BusValue::ObjectPath(
            ObjectPath::new(p.as_str()).map_err(|e| BusError::Decode(e.to_string()))?,
        ),
        Value::Value(inner) => BusValue::Variant(Box::new(from_value(inner)?)),
        Value::Array(array) => BusValue::Array(
            array
                .iter()
                .map(from_value)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Dict(dict) => BusValue::Dict(
            dict.iter()
                .map(|(k, v)| Ok((from_value(k)?, from_value(v)?)))
                .collect::<Result<Vec<_>, BusError>>()?,
        ),
        Value::Structure(fields) => BusValue::Struct(fields_from(fields.fields())?),
        other => {
            return Err(BusError::Unsupported(format!(
                "wire type {}",
                other.value_signature()
            )))
        }
    })
}

/// Converts the fields of a message body
pub fn fields_from(fields: &[Value<'_>]) -> Result<Vec<BusValue>, BusError> {
    fields.iter().map(from_value).collect()
}

/// Converts one argument for sending
///
/// Empty arrays and dictionaries carry no element type and are rejected;
/// use [`BusValue::Bytes`] for a byte array that may be empty.
pub fn to_value(value: &BusValue) -> Result<Value<'static>, BusError> {
    Ok(match value {
        BusValue::Bool(v) => Value::Bool(*v),
        BusValue::Byte(v) => Value::U8(*v),
        BusValue::I16(v) => Value::I16(*v),
        BusValue::U16(v) => Value::U16(*v),
        BusValue::I32(v) => Value::I32(*v),
        BusValue::U32(v) => Value::U32(*v),
        BusValue::I64(v) => Value::I64(*v),
        BusValue::U64(v) => Value::U64(*v),
        BusValue::F64(v) => Value::F64(*v),
        BusValue::Str(s) => Value::from(s.clone()),
        BusValue::Signature(s) => Value::Signature(
            Signature::try_from(s.clone()).map_err(|e| encode_error(value, e))?,
        ),
        BusValue::ObjectPath(p) => Value::ObjectPath(
            zvariant::ObjectPath::try_from(p.as_str().to_string())
                .map_err(|e| encode_error(value, e))?,
        ),
        BusValue::Variant(inner) => Value::Value(Box::new(to_value(inner)?)),
        BusValue::Array(items) => {
            let items = items.iter().map(to_value).collect::<Result<Vec<_>, _>>()?;
            let Some(first) = items.first() else {
                return Err(BusError::Unsupported("empty array".to_string()));
            };
            let mut array = Array::new(first.value_signature().to_owned());
            for item in items {
                array.append(item).map_err(|e| encode_error(value, e))?;
            }
            Value::Array(array)
        }
        BusValue::Bytes(bytes) => Value::from(bytes.clone()),
        BusValue::Dict(entries) => {
            let entries = entries
                .iter()
                .map(|(k, v)| Ok((to_value(k)?, to_value(v)?)))
                .collect::<Result<Vec<_>, BusError>>()?;
            let Some((key, val)) = entries.first() else {
                return Err(BusError::Unsupported("empty dict".to_string()));
            };
            let mut dict = Dict::new(
                key.value_signature().to_owned(),
                val.value_signature().to_owned(),
            );
            for (k, v) in entries {
                dict.append(k, v).map_err(|e| encode_error(value, e))?;
            }
            Value::Dict(dict)
        }
        BusValue::Struct(fields) => {
            if fields.is_empty() {
                return Err(BusError::Unsupported("empty struct".to_string()));
            }
            let mut builder = StructureBuilder::new();
            for field in fields {
                builder = builder.append_field(to_value(field)?);
            }
            Value::Structure(builder.build())
        }
    })
}

fn encode_error(value: &BusValue, error: impl std::fmt::Display) -> BusError {
    BusError::Unsupported(format!("{}: {error}", value.type_name()))
}
