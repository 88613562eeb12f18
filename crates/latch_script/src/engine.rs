//! Engine plug-in interface
//!
//! Each concrete script engine is a [`ScriptEngine`] that produces
//! [`EngineInstance`]s. Engines are picked at construction time, either
//! directly or by [`EngineKind`] through the process-wide registry.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;

use crate::config::RuntimeConfig;
use crate::error::ScriptError;
use crate::quickjs::QuickJsEngine;
use crate::value::{NativeFunction, ScriptValue};
use crate::wasm::WasmEngine;

/// Identifies an engine implementation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EngineKind {
    QuickJs,
    Wasm,
    /// Engines registered by the host application.
    Custom(&'static str),
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::QuickJs => write!(f, "quickjs"),
            EngineKind::Wasm => write!(f, "wasm"),
            EngineKind::Custom(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quickjs" | "js" => Ok(EngineKind::QuickJs),
            "wasm" | "wasmi" => Ok(EngineKind::Wasm),
            other => Err(format!("unknown engine '{other}' (expected quickjs or wasm)")),
        }
    }
}

/// Factory for engine instances.
pub trait ScriptEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Allocate a new, independent instance with its own heap and globals.
    fn create(&self, config: &RuntimeConfig) -> Result<Box<dyn EngineInstance>, ScriptError>;
}

/// One live engine instance, as seen by [`crate::ScriptRuntime`].
///
/// Adapters catch every script-level throw and return it as
/// `ScriptError::ScriptException`. The runtime performs lifecycle checks
/// before calling in, so adapters may assume they are not disposed.
pub trait EngineInstance {
    /// Evaluate source text. `origin` names the source for diagnostics.
    fn evaluate(&mut self, source: &str, origin: &str) -> Result<ScriptValue, ScriptError>;

    /// Evaluate raw source bytes. Text engines require UTF-8.
    fn evaluate_bytes(&mut self, source: &[u8], origin: &str) -> Result<ScriptValue, ScriptError> {
        let text = std::str::from_utf8(source)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        self.evaluate(text, origin)
    }

    /// Call a global script function.
    fn invoke(&mut self, function: &str, args: Vec<ScriptValue>)
        -> Result<ScriptValue, ScriptError>;

    /// Expose a native callback to scripts as a global function.
    fn register_function(&mut self, name: &str, function: NativeFunction)
        -> Result<(), ScriptError>;

    /// `false` once the engine can no longer accept calls.
    fn is_usable(&self) -> bool;

    /// Release the engine heap and everything pinned by it.
    fn dispose(&mut self);
}

/// Registry of available engines, keyed by kind.
static REGISTRY: Lazy<RwLock<HashMap<EngineKind, Arc<dyn ScriptEngine>>>> = Lazy::new(|| {
    let mut engines: HashMap<EngineKind, Arc<dyn ScriptEngine>> = HashMap::new();
    engines.insert(EngineKind::QuickJs, Arc::new(QuickJsEngine));
    engines.insert(EngineKind::Wasm, Arc::new(WasmEngine));
    RwLock::new(engines)
});

/// Register (or replace) an engine, returning the previous one.
pub fn register_engine(engine: Arc<dyn ScriptEngine>) -> Option<Arc<dyn ScriptEngine>> {
    let kind = engine.kind();
    tracing::debug!(engine = %kind, "registering script engine");
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(kind, engine)
}

/// Look up an engine by kind.
pub fn registered_engine(kind: EngineKind) -> Option<Arc<dyn ScriptEngine>> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&kind)
        .cloned()
}
