//! WASM engine adapter (wasmi)
//!
//! `evaluate` compiles a module (WAT text, or binary via `evaluate_bytes`)
//! and instantiates it; `invoke` calls an export by name, newest module
//! first. Only numbers cross this boundary: each argument is converted to
//! the parameter type the export declares, and results come back as numbers
//! (several results as an array). Traps and compile errors surface as `ScriptException`.

use latch_interop::{Dynamic, InteropError};
use serde_json::Number;
use tracing::debug;
use wasmi::{Engine, Instance, Linker, Module, Store, Val, ValType};

use crate::config::RuntimeConfig;
use crate::engine::{EngineInstance, EngineKind, ScriptEngine};
use crate::error::ScriptError;
use crate::value::{NativeFunction, ScriptValue};

/// Factory for wasmi instances.
#[derive(Debug, Default, Copy, Clone)]
pub struct WasmEngine;

impl ScriptEngine for WasmEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Wasm
    }

    fn create(&self, config: &RuntimeConfig) -> Result<Box<dyn EngineInstance>, ScriptError> {
        debug!(?config, "wasm instance created (limits not applied)");
        Ok(Box::new(WasmInstance::new()))
    }
}

/// One wasmi store and the module instances loaded into it.
pub struct WasmInstance {
    engine: Engine,
    store: Option<Store<()>>,
    modules: Vec<Instance>,
}

impl WasmInstance {
    pub fn new() -> Self {
        let engine = Engine::default();
        let store = Store::new(&engine, ());
        Self {
            engine,
            store: Some(store),
            modules: Vec::new(),
        }
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}

impl Default for WasmInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineInstance for WasmInstance {
    fn evaluate(&mut self, source: &str, origin: &str) -> Result<ScriptValue, ScriptError> {
        self.evaluate_bytes(source.as_bytes(), origin)
    }

    fn evaluate_bytes(&mut self, source: &[u8], origin: &str) -> Result<ScriptValue, ScriptError> {
        let store = self.store.as_mut().ok_or(ScriptError::RuntimeDisposed)?;
        let module = Module::new(&self.engine, source).map_err(trap)?;
        let linker = <Linker<()>>::new(&self.engine);
        let instance = linker.instantiate_and_start(&mut *store, &module).map_err(trap)?;
        self.modules.push(instance);

        debug!(origin, modules = self.modules.len(), "wasm module instantiated");
        Ok(ScriptValue::null())
    }

    fn invoke(
        &mut self,
        function: &str,
        args: Vec<ScriptValue>,
    ) -> Result<ScriptValue, ScriptError> {
        let store = self.store.as_mut().ok_or(ScriptError::RuntimeDisposed)?;
        let func = self
            .modules
            .iter()
            .rev()
            .find_map(|instance| instance.get_func(&*store, function))
            .ok_or_else(|| ScriptError::FunctionNotFound(function.to_string()))?;

        let ty = func.ty(&*store);
        if ty.params().len() != args.len() {
            return Err(InteropError::mismatch(
                format!("{} arguments", ty.params().len()),
                args.len().to_string(),
                "",
            )
            .into());
        }

        let mut inputs = Vec::with_capacity(args.len());
        for (index, (arg, param)) in args.iter().zip(ty.params()).enumerate() {
            inputs.push(arg_to_val(arg, *param, &format!("/{index}"))?);
        }
        let mut outputs: Vec<Val> = ty.results().iter().map(|ty| Val::default(*ty)).collect();
        func.call(&mut *store, &inputs, &mut outputs).map_err(trap)?;

        let mut results = Vec::with_capacity(outputs.len());
        for (index, output) in outputs.iter().enumerate() {
            results.push(val_to_dynamic(output, &format!("/{index}"))?);
        }
        Ok(ScriptValue::Value(match results.len() {
            0 => Dynamic::Null,
            1 => results.remove(0),
            _ => Dynamic::Array(results),
        }))
    }

    fn register_function(
        &mut self,
        _name: &str,
        _function: NativeFunction,
    ) -> Result<(), ScriptError> {
        Err(ScriptError::Unsupported("native functions"))
    }

    fn is_usable(&self) -> bool {
        self.store.is_some()
    }

    fn dispose(&mut self) {
        self.modules.clear();
        self.store = None;
        debug!("wasm instance disposed");
    }
}

fn trap(err: wasmi::Error) -> ScriptError {
    ScriptError::exception(err.to_string())
}

fn arg_to_val(arg: &ScriptValue, ty: ValType, path: &str) -> Result<Val, ScriptError> {
    let number = match arg {
        ScriptValue::Value(Dynamic::Number(number)) => number,
        ScriptValue::Value(other) => {
            return Err(InteropError::mismatch("number", kind_of(other), path).into())
        }
        ScriptValue::Handle(handle) => {
            return Err(InteropError::unsupported(handle.descriptor().type_name(), path).into())
        }
    };

    let val = match ty {
        ValType::I32 => Val::I32(integer_arg::<i32>(number, path)?),
        ValType::I64 => Val::I64(integer_arg::<i64>(number, path)?),
        ValType::F32 => Val::F32((float_arg(number) as f32).into()),
        ValType::F64 => Val::F64(float_arg(number).into()),
        other => return Err(InteropError::unsupported(format!("{other:?} parameter"), path).into()),
    };
    Ok(val)
}

fn integer_arg<T: TryFrom<i64>>(number: &Number, path: &str) -> Result<T, ScriptError> {
    number
        .as_i64()
        .and_then(|i| T::try_from(i).ok())
        .ok_or_else(|| {
            InteropError::mismatch(std::any::type_name::<T>(), number.to_string(), path).into()
        })
}

fn float_arg(number: &Number) -> f64 {
    number.as_f64().unwrap_or_default()
}

fn val_to_dynamic(val: &Val, path: &str) -> Result<Dynamic, ScriptError> {
    let float = |f: f64| {
        Number::from_f64(f)
            .map(Dynamic::Number)
            .ok_or_else(|| ScriptError::from(InteropError::unsupported("non-finite number", path)))
    };
    match val {
        Val::I32(i) => Ok(Dynamic::from(*i)),
        Val::I64(i) => Ok(Dynamic::from(*i)),
        Val::F32(f) => float(f32::from(*f) as f64),
        Val::F64(f) => float(f64::from(*f)),
        other => Err(InteropError::unsupported(format!("{:?}", other.ty()), path).into()),
    }
}

fn kind_of(value: &Dynamic) -> &'static str {
    match value {
        Dynamic::Null => "null",
        Dynamic::Bool(_) => "bool",
        Dynamic::Number(_) => "number",
        Dynamic::String(_) => "string",
        Dynamic::Array(_) => "array",
        Dynamic::Object(_) => "object",
    }
}
