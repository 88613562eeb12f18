//! QuickJS engine adapter
//!
//! Values cross as follows:
//! - dynamic values are rebuilt as plain JS values (`undefined` reads back as
//!   null)
//! - managed handles become opaque class instances owning a handle clone; the
//!   same handle comes back when a script returns or passes the instance, and
//!   the clone is released once the script drops its last reference
//! - integers outside `Number.MAX_SAFE_INTEGER` are rejected instead of
//!   rounded; integral JS numbers in range read back as integers
//!
//! Thrown values are caught here and returned as `ScriptException`.

use latch_interop::convert::pointer_child;
use latch_interop::{Dynamic, InteropError};
use rquickjs::function::Rest;
use rquickjs::{
    Array, CatchResultExt, CaughtError, Context, Ctx, Exception, Function, Object, Runtime, Value,
};
use serde_json::{Map, Number};
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::engine::{EngineInstance, EngineKind, ScriptEngine};
use crate::error::ScriptError;
use crate::ffi::{handle_of, handle_to_js, LiveHandles};
use crate::value::{NativeFunction, ScriptValue};

/// Largest integer a JS number represents exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Container nesting at which script values stop converting.
pub const MAX_DEPTH: usize = 256;

/// Factory for QuickJS instances.
#[derive(Debug, Default, Copy, Clone)]
pub struct QuickJsEngine;

impl ScriptEngine for QuickJsEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::QuickJs
    }

    fn create(&self, config: &RuntimeConfig) -> Result<Box<dyn EngineInstance>, ScriptError> {
        Ok(Box::new(QuickJsInstance::new(config)?))
    }
}

/// One QuickJS runtime with a full context.
pub struct QuickJsInstance {
    // Context before runtime: fields drop in declaration order.
    context: Option<Context>,
    runtime: Option<Runtime>,
    live: LiveHandles,
}

impl QuickJsInstance {
    pub fn new(config: &RuntimeConfig) -> Result<Self, ScriptError> {
        let runtime = Runtime::new().map_err(|err| ScriptError::EngineInit(err.to_string()))?;
        if let Some(limit) = config.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(size) = config.max_stack_size {
            runtime.set_max_stack_size(size);
        }
        if let Some(threshold) = config.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }
        let context =
            Context::full(&runtime).map_err(|err| ScriptError::EngineInit(err.to_string()))?;

        debug!(?config, "quickjs instance created");
        Ok(Self {
            context: Some(context),
            runtime: Some(runtime),
            live: LiveHandles::new(),
        })
    }

    fn context(&self) -> Result<&Context, ScriptError> {
        self.context.as_ref().ok_or(ScriptError::RuntimeDisposed)
    }
}

impl EngineInstance for QuickJsInstance {
    fn evaluate(&mut self, source: &str, origin: &str) -> Result<ScriptValue, ScriptError> {
        self.context()?.with(|ctx| {
            debug!(origin, bytes = source.len(), "evaluating script");
            let result = ctx
                .eval::<Value, _>(source)
                .catch(&ctx)
                .map_err(caught_to_error)?;
            from_js(&result)
        })
    }

    fn invoke(
        &mut self,
        function: &str,
        args: Vec<ScriptValue>,
    ) -> Result<ScriptValue, ScriptError> {
        let live = &self.live;
        self.context()?.with(|ctx| {
            let target: Value = ctx.globals().get(function)?;
            let Some(callable) = target.as_function() else {
                return Err(ScriptError::FunctionNotFound(function.to_string()));
            };

            let mut js_args = Vec::with_capacity(args.len());
            for arg in &args {
                js_args.push(to_js(&ctx, arg, live)?);
            }
            let result = callable
                .call::<_, Value>((Rest(js_args),))
                .catch(&ctx)
                .map_err(caught_to_error)?;
            from_js(&result)
        })
    }

    fn register_function(
        &mut self,
        name: &str,
        function: NativeFunction,
    ) -> Result<(), ScriptError> {
        let live = self.live.clone();
        self.context()?
            .with(|ctx| install_native(&ctx, name, function, live))
    }

    fn is_usable(&self) -> bool {
        self.context.is_some()
    }

    fn dispose(&mut self) {
        self.context = None;
        if let Some(runtime) = self.runtime.take() {
            runtime.run_gc();
        }
        debug!(live = self.live.count(), "quickjs instance disposed");
    }
}

fn install_native<'js>(
    ctx: &Ctx<'js>,
    name: &str,
    function: NativeFunction,
    live: LiveHandles,
) -> Result<(), ScriptError> {
    let callback = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            let mut native_args = Vec::with_capacity(args.0.len());
            for arg in args.0.iter() {
                native_args.push(from_js(arg).map_err(|err| throw(&ctx, &err))?);
            }
            let result = function(native_args).map_err(|err| throw(&ctx, &err))?;
            to_js(&ctx, &result, &live).map_err(|err| throw(&ctx, &err))
        },
    )?;
    ctx.globals().set(name, callback)?;
    debug!(name, "registered native function");
    Ok(())
}

/// Turn a native failure into a JS exception inside a callback.
fn throw(ctx: &Ctx<'_>, err: &ScriptError) -> rquickjs::Error {
    match err {
        ScriptError::ScriptException { message, .. } => Exception::throw_message(ctx, message),
        other => Exception::throw_message(ctx, &other.to_string()),
    }
}

fn caught_to_error(caught: CaughtError<'_>) -> ScriptError {
    match caught {
        CaughtError::Exception(exception) => ScriptError::ScriptException {
            message: exception
                .message()
                .unwrap_or_else(|| "uncaught exception".to_string()),
            stack: exception.stack().filter(|stack| !stack.is_empty()),
        },
        CaughtError::Value(value) => ScriptError::exception(describe_thrown(&value)),
        CaughtError::Error(err) => ScriptError::Engine(err.to_string()),
    }
}

fn describe_thrown(value: &Value<'_>) -> String {
    match js_to_dynamic(value, "") {
        Ok(Dynamic::String(message)) => message,
        Ok(other) => other.to_string(),
        Err(_) => format!("thrown {:?}", value.type_of()),
    }
}

/// Convert a script value into its native form.
pub fn from_js(value: &Value<'_>) -> Result<ScriptValue, ScriptError> {
    if let Some(handle) = value.as_object().and_then(|object| handle_of(object)) {
        return Ok(ScriptValue::Handle(handle));
    }
    Ok(ScriptValue::Value(js_to_dynamic(value, "")?))
}

/// Convert a native value into a script value.
pub fn to_js<'js>(
    ctx: &Ctx<'js>,
    value: &ScriptValue,
    live: &LiveHandles,
) -> Result<Value<'js>, ScriptError> {
    match value {
        ScriptValue::Value(dynamic) => dynamic_to_js(ctx, dynamic, ""),
        ScriptValue::Handle(handle) => Ok(handle_to_js(ctx, handle, live)?),
    }
}

/// Convert a JS value into a dynamic value.
///
/// Only primitives, arrays and plain objects (prototype `Object.prototype`
/// or none) convert. Cycles and nesting deeper than [`MAX_DEPTH`] fail.
pub fn js_to_dynamic(value: &Value<'_>, path: &str) -> Result<Dynamic, ScriptError> {
    let plain_proto = Object::new(value.ctx().clone())?.get_prototype();
    JsWalker {
        plain_proto,
        ancestors: Vec::new(),
    }
    .walk(value, path)
}

struct JsWalker<'js> {
    plain_proto: Option<Object<'js>>,
    /// Containers on the path from the root to the current value.
    ancestors: Vec<Object<'js>>,
}

impl<'js> JsWalker<'js> {
    fn walk(&mut self, value: &Value<'js>, path: &str) -> Result<Dynamic, ScriptError> {
        if value.is_undefined() || value.is_null() {
            return Ok(Dynamic::Null);
        }
        if let Some(b) = value.as_bool() {
            return Ok(Dynamic::Bool(b));
        }
        if let Some(i) = value.as_int() {
            return Ok(Dynamic::from(i));
        }
        if let Some(f) = value.as_float() {
            return float_to_dynamic(f, path);
        }
        if let Some(s) = value.as_string() {
            return Ok(Dynamic::String(s.to_string()?));
        }
        if value.is_function() {
            return Err(InteropError::unsupported("function", path).into());
        }
        let Some(object) = value.as_object() else {
            return Err(InteropError::unsupported(value.type_name(), path).into());
        };
        if handle_of(object).is_some() {
            // Dynamic data cannot carry handles; only top-level handles resolve.
            return Err(InteropError::unsupported("managed handle", path).into());
        }
        if self.ancestors.contains(object) {
            return Err(InteropError::unsupported("cyclic object", path).into());
        }
        if self.ancestors.len() >= MAX_DEPTH {
            let depth = format!("nesting deeper than {MAX_DEPTH}");
            return Err(InteropError::unsupported(depth, path).into());
        }

        self.ancestors.push(object.clone());
        let result = match value.as_array() {
            Some(array) => self.walk_array(array, path),
            None => self.walk_object(object, path),
        };
        self.ancestors.pop();
        result
    }

    fn walk_array(&mut self, array: &Array<'js>, path: &str) -> Result<Dynamic, ScriptError> {
        let mut items = Vec::with_capacity(array.len());
        for (index, item) in array.iter::<Value>().enumerate() {
            items.push(self.walk(&item?, &pointer_child(path, &index.to_string()))?);
        }
        Ok(Dynamic::Array(items))
    }

    fn walk_object(&mut self, object: &Object<'js>, path: &str) -> Result<Dynamic, ScriptError> {
        let proto = object.get_prototype();
        if proto.is_some() && proto != self.plain_proto {
            return Err(InteropError::unsupported(class_name(object), path).into());
        }
        let mut map = Map::new();
        for entry in object.props::<String, Value>() {
            let (key, item) = entry?;
            let item = self.walk(&item, &pointer_child(path, &key))?;
            map.insert(key, item);
        }
        Ok(Dynamic::Object(map))
    }
}

/// Constructor name of a non-plain object, for diagnostics.
fn class_name(object: &Object<'_>) -> String {
    object
        .get::<_, Object>("constructor")
        .and_then(|constructor| constructor.get::<_, String>("name"))
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "object".to_string())
}

fn float_to_dynamic(f: f64, path: &str) -> Result<Dynamic, ScriptError> {
    if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER as f64 {
        return Ok(Dynamic::from(f as i64));
    }
    Number::from_f64(f)
        .map(Dynamic::Number)
        .ok_or_else(|| InteropError::unsupported("non-finite number", path).into())
}

/// Convert a dynamic value into a JS value.
pub fn dynamic_to_js<'js>(
    ctx: &Ctx<'js>,
    value: &Dynamic,
    path: &str,
) -> Result<Value<'js>, ScriptError> {
    Ok(match value {
        Dynamic::Null => Value::new_null(ctx.clone()),
        Dynamic::Bool(b) => Value::new_bool(ctx.clone(), *b),
        Dynamic::Number(n) => number_to_js(ctx, n, path)?,
        Dynamic::String(s) => rquickjs::String::from_str(ctx.clone(), s)?.into_value(),
        Dynamic::Array(items) => {
            let array = Array::new(ctx.clone())?;
            for (index, item) in items.iter().enumerate() {
                let child = pointer_child(path, &index.to_string());
                array.set(index, dynamic_to_js(ctx, item, &child)?)?;
            }
            array.into_value()
        }
        Dynamic::Object(map) => {
            let object = Object::new(ctx.clone())?;
            for (key, item) in map {
                object.set(key.as_str(), dynamic_to_js(ctx, item, &pointer_child(path, key))?)?;
            }
            object.into_value()
        }
    })
}

fn number_to_js<'js>(ctx: &Ctx<'js>, n: &Number, path: &str) -> Result<Value<'js>, ScriptError> {
    if let Some(i) = n.as_i64() {
        if !(-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&i) {
            return Err(unsafe_integer(&i.to_string(), path));
        }
        return Ok(match i32::try_from(i) {
            Ok(small) => Value::new_int(ctx.clone(), small),
            Err(_) => Value::new_float(ctx.clone(), i as f64),
        });
    }
    if let Some(u) = n.as_u64() {
        // Anything above i64::MAX is far outside the safe range.
        return Err(unsafe_integer(&u.to_string(), path));
    }
    Ok(Value::new_float(ctx.clone(), n.as_f64().unwrap_or_default()))
}

fn unsafe_integer(found: &str, path: &str) -> ScriptError {
    InteropError::mismatch("integer within Number.MAX_SAFE_INTEGER", found, path).into()
}
