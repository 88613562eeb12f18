//! Dynamic value conversion
//!
//! Maps between `Dynamic` (schema-less JSON-shaped values) and the native
//! object graph. Conversion is pure: it touches nothing but its input and
//! output, so it can run on any thread.
//!
//! Numbers keep their integer/float distinction at full 64-bit precision.
//! Non-finite floats have no dynamic representation and are rejected.

use serde_json::{Map, Number, Value};
use tracing::trace;

use crate::error::InteropError;
use crate::native::{NativeArray, NativeDictionary, NativeNumber, NativeObject};

/// Schema-less tagged value: null, bool, number, string, array, or
/// string-keyed ordered map.
pub type Dynamic = Value;

/// Convert a native object graph into a dynamic value.
///
/// Fails with `UnsupportedType` for any runtime class outside the
/// convertible set and with `ConversionMismatch` for non-string
/// dictionary keys. Nothing is dropped or defaulted.
pub fn to_dynamic(value: &NativeObject) -> Result<Dynamic, InteropError> {
    native_to_dynamic(value, "")
}

/// Build the native object graph for a dynamic value.
pub fn from_dynamic(value: &Dynamic) -> NativeObject {
    match value {
        Value::Null => NativeObject::null(),
        Value::Bool(b) => NativeObject::new(*b),
        Value::Number(n) => number_to_native(n),
        Value::String(s) => NativeObject::new(s.clone()),
        Value::Array(items) => {
            NativeObject::new(items.iter().map(from_dynamic).collect::<NativeArray>())
        }
        Value::Object(map) => {
            let mut dict = NativeDictionary::new();
            for (key, item) in map {
                dict.insert(key.clone(), from_dynamic(item));
            }
            NativeObject::new(dict)
        }
    }
}

/// Append a segment to a JSON-pointer style path.
pub fn pointer_child(parent: &str, segment: &str) -> String {
    let escaped = segment.replace('~', "~0").replace('/', "~1");
    format!("{parent}/{escaped}")
}

fn native_to_dynamic(value: &NativeObject, path: &str) -> Result<Dynamic, InteropError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(Value::Bool(b));
    }
    if let Some(n) = value.as_number() {
        return native_number_to_dynamic(n, value.type_name(), path);
    }
    if let Some(s) = value.as_str() {
        return Ok(Value::String(s.to_string()));
    }
    if let Some(array) = value.downcast_ref::<NativeArray>() {
        trace!(len = array.len(), path, "converting native array");
        let mut items = Vec::with_capacity(array.len());
        for (index, item) in array.iter().enumerate() {
            items.push(native_to_dynamic(item, &pointer_child(path, &index.to_string()))?);
        }
        return Ok(Value::Array(items));
    }
    if let Some(dict) = value.downcast_ref::<NativeDictionary>() {
        trace!(len = dict.len(), path, "converting native dictionary");
        let mut map = Map::new();
        for (key, item) in dict.iter() {
            let Some(key) = key.as_str() else {
                return Err(InteropError::mismatch("string key", key.type_name(), path));
            };
            let item = native_to_dynamic(item, &pointer_child(path, key))?;
            map.insert(key.to_string(), item);
        }
        return Ok(Value::Object(map));
    }

    Err(InteropError::unsupported(value.type_name(), path))
}

fn native_number_to_dynamic(
    n: NativeNumber,
    type_name: &str,
    path: &str,
) -> Result<Dynamic, InteropError> {
    match n {
        NativeNumber::Int(i) => Ok(Value::from(i)),
        NativeNumber::UInt(u) => Ok(Value::from(u)),
        NativeNumber::Float(f) => Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| InteropError::unsupported(format!("{type_name} (non-finite)"), path)),
    }
}

fn number_to_native(n: &Number) -> NativeObject {
    if let Some(i) = n.as_i64() {
        NativeObject::new(i)
    } else if let Some(u) = n.as_u64() {
        NativeObject::new(u)
    } else {
        // Without arbitrary precision every remaining number is an f64.
        NativeObject::new(n.as_f64().unwrap_or_default())
    }
}
