//! Latch Scripting System
//!
//! Engine-agnostic script execution over pluggable engines.
//!
//! ## Architecture
//!
//! - **Interface:** [`ScriptRuntime`] drives one engine instance through the
//!   Uninitialized -> Ready -> Disposed lifecycle
//! - **QuickJS:** JavaScript evaluation with native callbacks
//! - **WASM:** wasmi modules (WAT or binary) with numeric exports
//! - **FFI:** arguments and results cross as [`ScriptValue`]s: dynamic values
//!   are converted, managed handles travel as opaque script objects

pub mod config;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod quickjs;
pub mod runtime;
pub mod value;
pub mod wasm;

pub use config::RuntimeConfig;
pub use engine::{register_engine, registered_engine, EngineInstance, EngineKind, ScriptEngine};
pub use error::ScriptError;
pub use runtime::{RuntimeState, RuntimeStats, ScriptRuntime};
pub use value::{NativeFunction, ScriptValue};

pub use rquickjs;
pub use wasmi;
