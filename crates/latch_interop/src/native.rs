//! Native object model
//!
//! Host objects are reference counted and dynamically typed. A
//! [`NativeObject`] is the base handle every host value travels in; code
//! that needs the concrete value inspects its runtime class with
//! [`NativeObject::downcast_ref`].
//!
//! Only a closed set of classes maps onto dynamic values:
//! - [`NativeNull`] and `()`
//! - `bool`
//! - signed/unsigned integers and `f32`/`f64`
//! - `String` and `&'static str`
//! - [`NativeArray`] and [`NativeDictionary`]

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use crate::handle::ManagedHandle;

/// Explicit null object (the host's "null singleton").
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct NativeNull;

/// Reference-counted host object of any runtime class.
///
/// Cloning shares the object; it never copies the underlying value.
#[derive(Clone)]
pub struct NativeObject {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl NativeObject {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    pub fn null() -> Self {
        Self::new(NativeNull)
    }

    /// Box a managed handle so it can sit inside a native collection.
    pub fn from_handle(handle: ManagedHandle) -> Self {
        Self::new(handle)
    }

    /// Name of the runtime class, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Identity comparison (same allocation).
    pub fn ptr_eq(&self, other: &NativeObject) -> bool {
        Arc::as_ptr(&self.inner) as *const () == Arc::as_ptr(&other.inner) as *const ()
    }

    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn is_null(&self) -> bool {
        self.is::<NativeNull>() || self.is::<()>()
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.downcast_ref::<bool>().copied()
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Some(s) = self.downcast_ref::<String>() {
            return Some(s.as_str());
        }
        self.downcast_ref::<&'static str>().copied()
    }

    pub fn as_handle(&self) -> Option<&ManagedHandle> {
        self.downcast_ref::<ManagedHandle>()
    }

    /// Classify numeric runtime classes.
    ///
    /// Unsigned values that fit `i64` are reported as `Int` so the same
    /// number compares equal regardless of the width it was stored with.
    pub fn as_number(&self) -> Option<NativeNumber> {
        macro_rules! signed {
            ($obj:expr; $($ty:ty),*) => {
                $(
                    if let Some(v) = $obj.downcast_ref::<$ty>() {
                        return Some(NativeNumber::Int(*v as i64));
                    }
                )*
            };
        }
        macro_rules! unsigned {
            ($obj:expr; $($ty:ty),*) => {
                $(
                    if let Some(v) = $obj.downcast_ref::<$ty>() {
                        let v = *v as u64;
                        return Some(match i64::try_from(v) {
                            Ok(i) => NativeNumber::Int(i),
                            Err(_) => NativeNumber::UInt(v),
                        });
                    }
                )*
            };
        }

        signed!(self; i64, i32, i16, i8, isize);
        unsigned!(self; u64, u32, u16, u8, usize);

        if let Some(v) = self.downcast_ref::<f64>() {
            return Some(NativeNumber::Float(*v));
        }
        if let Some(v) = self.downcast_ref::<f32>() {
            return Some(NativeNumber::Float(*v as f64));
        }
        None
    }

    /// Structural equality.
    ///
    /// Numbers compare by value across widths, strings by content,
    /// collections element-wise (dictionaries ignore entry order). Any
    /// other class only equals itself.
    pub fn deep_eq(&self, other: &NativeObject) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if self.is_null() || other.is_null() {
            return self.is_null() && other.is_null();
        }
        if let (Some(a), Some(b)) = (self.as_bool(), other.as_bool()) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (self.as_str(), other.as_str()) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (
            self.downcast_ref::<NativeArray>(),
            other.downcast_ref::<NativeArray>(),
        ) {
            return a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.deep_eq(y));
        }
        if let (Some(a), Some(b)) = (
            self.downcast_ref::<NativeDictionary>(),
            other.downcast_ref::<NativeDictionary>(),
        ) {
            return a.len() == b.len()
                && a.iter().all(|(key, value)| {
                    b.get_by(key).map_or(false, |found| found.deep_eq(value))
                });
        }
        if let (Some(a), Some(b)) = (self.as_handle(), other.as_handle()) {
            return a.ptr_eq(b);
        }
        false
    }
}

impl fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeObject")
            .field("class", &self.type_name)
            .field("address", &(Arc::as_ptr(&self.inner) as *const ()))
            .finish()
    }
}

/// Numeric payload of a native number object.
#[derive(Debug, Copy, Clone)]
pub enum NativeNumber {
    Int(i64),
    /// Only used above `i64::MAX`.
    UInt(u64),
    Float(f64),
}

impl PartialEq for NativeNumber {
    fn eq(&self, other: &Self) -> bool {
        use NativeNumber::*;
        match (*self, *other) {
            (Int(a), Int(b)) => a == b,
            (UInt(a), UInt(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Int(_), UInt(_)) | (UInt(_), Int(_)) => false,
            (Int(i), Float(f)) | (Float(f), Int(i)) => {
                f.fract() == 0.0 && f == i as f64 && f as i64 == i
            }
            (UInt(u), Float(f)) | (Float(f), UInt(u)) => {
                f.fract() == 0.0 && f == u as f64 && f as u64 == u
            }
        }
    }
}

macro_rules! native_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for NativeObject {
                fn from(value: $ty) -> Self {
                    NativeObject::new(value)
                }
            }
        )*
    };
}

native_from!(
    NativeNull, bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String,
    &'static str, NativeArray, NativeDictionary, ManagedHandle
);

/// Ordered collection of native objects (the host's array class).
#[derive(Debug, Clone, Default)]
pub struct NativeArray(Vec<NativeObject>);

impl NativeArray {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    pub fn push(&mut self, value: impl Into<NativeObject>) {
        self.0.push(value.into());
    }

    pub fn get(&self, index: usize) -> Option<&NativeObject> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NativeObject> {
        self.0.iter()
    }
}

impl FromIterator<NativeObject> for NativeArray {
    fn from_iter<I: IntoIterator<Item = NativeObject>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a NativeArray {
    type Item = &'a NativeObject;
    type IntoIter = std::slice::Iter<'a, NativeObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Key-value collection of native objects (the host's dictionary class).
///
/// Keys are arbitrary objects, as in the host model. Entries keep their
/// insertion order; inserting a key equal to an existing one replaces the
/// value in place.
#[derive(Debug, Clone, Default)]
pub struct NativeDictionary {
    entries: Vec<(NativeObject, NativeObject)>,
}

impl NativeDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, returning the previous value for an equal key.
    pub fn insert(
        &mut self,
        key: impl Into<NativeObject>,
        value: impl Into<NativeObject>,
    ) -> Option<NativeObject> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| existing.deep_eq(&key)) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Look up a value by string key.
    pub fn get(&self, key: &str) -> Option<&NativeObject> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.as_str() == Some(key))
            .map(|(_, value)| value)
    }

    /// Look up a value by structurally equal key.
    pub fn get_by(&self, key: &NativeObject) -> Option<&NativeObject> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.deep_eq(key))
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NativeObject, &NativeObject)> {
        self.entries.iter().map(|(key, value)| (key, value))
    }
}

impl FromIterator<(NativeObject, NativeObject)> for NativeDictionary {
    fn from_iter<I: IntoIterator<Item = (NativeObject, NativeObject)>>(iter: I) -> Self {
        let mut dict = Self::new();
        for (key, value) in iter {
            dict.insert(key, value);
        }
        dict
    }
}
