//! Latch Interop
//!
//! Primitives for moving values between the host object model and
//! embedded script engines:
//! - Dynamic value conversion (JSON-shaped values <-> native objects)
//! - Type-erased managed handles for opaque native payloads
//! - The native object model both sides agree on

pub mod convert;
pub mod error;
pub mod handle;
pub mod native;

pub use convert::{from_dynamic, to_dynamic, Dynamic};
pub use error::InteropError;
pub use handle::{managed, HandleDescriptor, ManagedHandle};
pub use native::{NativeArray, NativeDictionary, NativeNull, NativeObject};

pub use serde_json;

/// Interop layer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
