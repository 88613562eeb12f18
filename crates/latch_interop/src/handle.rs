//! Managed handles
//!
//! A [`ManagedHandle`] owns a native value of any type behind a shared,
//! type-erased owner. Code that only sees the handle gets an opaque address
//! (for identity and debugging); code that knows the original type gets the
//! value back with [`ManagedHandle::unwrap`].
//!
//! Lifetime follows the shared owner: cloning a handle bumps the reference
//! count, dropping the last clone drops the value exactly once.
//!
//! Example:
//! ```ignore
//! let handle = managed::<Counter, _>(5);
//! let counter: &Counter = handle.unwrap::<Counter>()?;
//! ```

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::InteropError;

/// Out-of-band description of the value behind a handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HandleDescriptor {
    type_name: &'static str,
}

impl HandleDescriptor {
    pub fn of<T: Any>() -> Self {
        Self {
            type_name: type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Type-erased, reference-counted owner of a native value.
///
/// Adds no synchronization of its own: sharing a handle across threads is
/// as safe as sharing `&T`.
#[derive(Clone)]
pub struct ManagedHandle {
    owner: Arc<dyn Any + Send + Sync>,
    descriptor: HandleDescriptor,
}

impl ManagedHandle {
    /// Move `value` into a new shared owner.
    pub fn wrap<T: Any + Send + Sync>(value: T) -> Self {
        let owner: Arc<dyn Any + Send + Sync> = Arc::new(value);
        let descriptor = HandleDescriptor::of::<T>();
        debug!(
            type_name = descriptor.type_name(),
            address = ?(Arc::as_ptr(&owner) as *const ()),
            "wrapped managed value"
        );
        Self { owner, descriptor }
    }

    /// Borrow the managed value as its original type.
    ///
    /// The caller must know the type the handle was created with; asking
    /// for any other type is a `ConversionMismatch`.
    pub fn unwrap<T: Any>(&self) -> Result<&T, InteropError> {
        self.owner.downcast_ref::<T>().ok_or_else(|| {
            InteropError::mismatch(type_name::<T>(), self.descriptor.type_name(), "")
        })
    }

    /// Opaque address of the managed storage. Identical across clones.
    ///
    /// Never dereference this without knowing the original type.
    pub fn void_pointer(&self) -> *const () {
        Arc::as_ptr(&self.owner) as *const ()
    }

    pub fn address(&self) -> usize {
        self.void_pointer() as usize
    }

    pub fn descriptor(&self) -> HandleDescriptor {
        self.descriptor
    }

    /// Number of live handles sharing the value.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.owner)
    }

    pub fn ptr_eq(&self, other: &ManagedHandle) -> bool {
        self.void_pointer() == other.void_pointer()
    }
}

impl fmt::Debug for ManagedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedHandle")
            .field("type", &self.descriptor.type_name())
            .field("address", &self.void_pointer())
            .finish()
    }
}

/// Construct a `T` from `initializer` and hand it out as a managed handle.
pub fn managed<T, P>(initializer: P) -> ManagedHandle
where
    T: From<P> + Any + Send + Sync,
{
    ManagedHandle::wrap(T::from(initializer))
}
