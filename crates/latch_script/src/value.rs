//! Values crossing the script runtime interface

use latch_interop::{from_dynamic, to_dynamic, Dynamic, InteropError, ManagedHandle, NativeObject};

use crate::error::ScriptError;

/// Argument or result of a script call.
///
/// Plain data crosses as a dynamic value; anything else must be wrapped in
/// a managed handle and travels as an opaque script object.
#[derive(Debug, Clone)]
pub enum ScriptValue {
    Value(Dynamic),
    Handle(ManagedHandle),
}

/// Native callback exposed to scripts.
pub type NativeFunction = Box<dyn Fn(Vec<ScriptValue>) -> Result<ScriptValue, ScriptError>>;

impl ScriptValue {
    pub fn null() -> Self {
        ScriptValue::Value(Dynamic::Null)
    }

    pub fn as_dynamic(&self) -> Option<&Dynamic> {
        match self {
            ScriptValue::Value(value) => Some(value),
            ScriptValue::Handle(_) => None,
        }
    }

    pub fn as_handle(&self) -> Option<&ManagedHandle> {
        match self {
            ScriptValue::Handle(handle) => Some(handle),
            ScriptValue::Value(_) => None,
        }
    }

    pub fn into_dynamic(self) -> Result<Dynamic, InteropError> {
        match self {
            ScriptValue::Value(value) => Ok(value),
            ScriptValue::Handle(handle) => Err(InteropError::unsupported(
                handle.descriptor().type_name(),
                "",
            )),
        }
    }

    /// Build from a native object: handles stay handles, everything else
    /// goes through dynamic conversion.
    pub fn from_native(object: &NativeObject) -> Result<Self, InteropError> {
        match object.as_handle() {
            Some(handle) => Ok(ScriptValue::Handle(handle.clone())),
            None => Ok(ScriptValue::Value(to_dynamic(object)?)),
        }
    }

    pub fn to_native(&self) -> NativeObject {
        match self {
            ScriptValue::Value(value) => from_dynamic(value),
            ScriptValue::Handle(handle) => NativeObject::from_handle(handle.clone()),
        }
    }
}

impl PartialEq for ScriptValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ScriptValue::Value(a), ScriptValue::Value(b)) => a == b,
            (ScriptValue::Handle(a), ScriptValue::Handle(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<Dynamic> for ScriptValue {
    fn from(value: Dynamic) -> Self {
        ScriptValue::Value(value)
    }
}

impl From<ManagedHandle> for ScriptValue {
    fn from(handle: ManagedHandle) -> Self {
        ScriptValue::Handle(handle)
    }
}
