//! Script runtime management
//!
//! [`ScriptRuntime`] is the engine-agnostic entry point: it owns one engine
//! instance and enforces its lifecycle.
//!
//! ```text
//! Uninitialized --create--> Ready --dispose--> Disposed
//! ```
//!
//! Only `Ready` accepts calls. A failed call leaves the runtime `Ready`
//! unless the engine reports the instance unusable, which disposes it.
//! A runtime must be driven from one thread at a time.

use std::path::Path;

use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::engine::{registered_engine, EngineInstance, EngineKind, ScriptEngine};
use crate::error::ScriptError;
use crate::value::ScriptValue;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RuntimeState {
    Uninitialized,
    Ready,
    Disposed,
}

/// Call counters for diagnostics.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub evaluations: u64,
    pub invocations: u64,
    pub failures: u64,
}

/// Script execution context
pub struct ScriptRuntime {
    kind: EngineKind,
    state: RuntimeState,
    instance: Option<Box<dyn EngineInstance>>,
    stats: RuntimeStats,
}

impl ScriptRuntime {
    /// QuickJS runtime with default limits.
    pub fn new() -> Result<Self, ScriptError> {
        Self::with_kind(EngineKind::QuickJs, &RuntimeConfig::default())
    }

    /// Create a runtime on a registered engine.
    pub fn with_kind(kind: EngineKind, config: &RuntimeConfig) -> Result<Self, ScriptError> {
        let engine = registered_engine(kind)
            .ok_or_else(|| ScriptError::EngineInit(format!("no engine registered as '{kind}'")))?;
        Self::create(engine.as_ref(), config)
    }

    /// Create a runtime on an explicit engine.
    pub fn create(engine: &dyn ScriptEngine, config: &RuntimeConfig) -> Result<Self, ScriptError> {
        let mut runtime = Self {
            kind: engine.kind(),
            state: RuntimeState::Uninitialized,
            instance: None,
            stats: RuntimeStats::default(),
        };
        let instance = engine.create(config)?;
        runtime.instance = Some(instance);
        runtime.state = RuntimeState::Ready;

        info!(engine = %runtime.kind, "script runtime ready");
        Ok(runtime)
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn stats(&self) -> RuntimeStats {
        self.stats
    }

    pub fn evaluate(&mut self, source: &str) -> Result<ScriptValue, ScriptError> {
        self.evaluate_named(source, "<eval>")
    }

    /// Evaluate source text, naming it `origin` in diagnostics.
    pub fn evaluate_named(
        &mut self,
        source: &str,
        origin: &str,
    ) -> Result<ScriptValue, ScriptError> {
        let result = self.ready_instance()?.evaluate(source, origin);
        self.stats.evaluations += 1;
        self.settle(result, origin)
    }

    /// Evaluate raw source, such as a binary WASM module.
    pub fn evaluate_bytes(
        &mut self,
        source: &[u8],
        origin: &str,
    ) -> Result<ScriptValue, ScriptError> {
        let result = self.ready_instance()?.evaluate_bytes(source, origin);
        self.stats.evaluations += 1;
        self.settle(result, origin)
    }

    /// Read a file and evaluate it with its path as the origin.
    pub fn evaluate_file(&mut self, path: &Path) -> Result<ScriptValue, ScriptError> {
        self.ready_instance()?;
        let source = std::fs::read(path)?;
        self.evaluate_bytes(&source, &path.display().to_string())
    }

    /// Call a global script function with the given arguments.
    pub fn invoke(
        &mut self,
        function: &str,
        args: Vec<ScriptValue>,
    ) -> Result<ScriptValue, ScriptError> {
        let result = self.ready_instance()?.invoke(function, args);
        self.stats.invocations += 1;
        self.settle(result, function)
    }

    /// Expose a native callback to scripts under `name`.
    pub fn register_function<F>(&mut self, name: &str, function: F) -> Result<(), ScriptError>
    where
        F: Fn(Vec<ScriptValue>) -> Result<ScriptValue, ScriptError> + 'static,
    {
        let result = self.ready_instance()?.register_function(name, Box::new(function));
        self.settle(result, name)
    }

    /// Tear down the engine instance. Idempotent; `Disposed` is terminal.
    pub fn dispose(&mut self) {
        if let Some(mut instance) = self.instance.take() {
            instance.dispose();
            info!(engine = %self.kind, "script runtime disposed");
        }
        self.state = RuntimeState::Disposed;
    }

    fn ready_instance(&mut self) -> Result<&mut Box<dyn EngineInstance>, ScriptError> {
        match (self.state, self.instance.as_mut()) {
            (RuntimeState::Ready, Some(instance)) => Ok(instance),
            _ => Err(ScriptError::RuntimeDisposed),
        }
    }

    fn settle<T>(
        &mut self,
        result: Result<T, ScriptError>,
        subject: &str,
    ) -> Result<T, ScriptError> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        self.stats.failures += 1;
        if let ScriptError::ScriptException { message, .. } = &err {
            warn!(engine = %self.kind, subject, %message, "script exception");
        }
        if self.instance.as_ref().map_or(false, |instance| !instance.is_usable()) {
            warn!(engine = %self.kind, "engine instance no longer usable; disposing");
            self.dispose();
        }
        Err(err)
    }
}

impl Drop for ScriptRuntime {
    fn drop(&mut self) {
        self.dispose();
    }
}
