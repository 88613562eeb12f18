//! FFI layer between Rust and scripts
//!
//! A managed handle handed to a script travels inside a [`HandleCell`], an
//! opaque class instance that owns a clone of the handle. Script code cannot
//! construct or inspect cells; it can only hold them and pass them back.
//! When the engine collects the last script reference the cell is finalized
//! and its clone released.

use std::cell::Cell;
use std::rc::Rc;

use latch_interop::ManagedHandle;
use rquickjs::class::{ClassId, JsClass, Readable, Trace, Tracer};
use rquickjs::function::Constructor;
use rquickjs::{Class, Ctx, Object, Value};

/// Number of handle cells a runtime currently has alive.
#[derive(Debug, Clone, Default)]
pub struct LiveHandles(Rc<Cell<usize>>);

impl LiveHandles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.0.get()
    }
}

/// Script-side owner of one managed handle clone.
pub struct HandleCell {
    handle: ManagedHandle,
    live: LiveHandles,
}

impl HandleCell {
    fn new(handle: &ManagedHandle, live: &LiveHandles) -> Self {
        live.0.set(live.0.get() + 1);
        Self {
            handle: handle.clone(),
            live: live.clone(),
        }
    }

    pub fn handle(&self) -> &ManagedHandle {
        &self.handle
    }
}

impl Drop for HandleCell {
    fn drop(&mut self) {
        let live = &self.live.0;
        live.set(live.get().saturating_sub(1));
    }
}

impl<'js> Trace<'js> for HandleCell {
    fn trace<'a>(&self, _tracer: Tracer<'a, 'js>) {}
}

impl<'js> JsClass<'js> for HandleCell {
    const NAME: &'static str = "ManagedHandle";

    type Mutable = Readable;

    fn class_id() -> &'static ClassId {
        static ID: ClassId = ClassId::new();
        &ID
    }

    fn prototype(ctx: &Ctx<'js>) -> rquickjs::Result<Option<Object<'js>>> {
        Ok(Some(Object::new(ctx.clone())?))
    }

    fn constructor(_ctx: &Ctx<'js>) -> rquickjs::Result<Option<Constructor<'js>>> {
        Ok(None)
    }
}

/// Wrap a handle in a fresh cell object.
pub fn handle_to_js<'js>(
    ctx: &Ctx<'js>,
    handle: &ManagedHandle,
    live: &LiveHandles,
) -> rquickjs::Result<Value<'js>> {
    Ok(Class::instance(ctx.clone(), HandleCell::new(handle, live))?.into_value())
}

/// The handle carried by `object`, if it is a cell.
pub fn handle_of(object: &Object<'_>) -> Option<ManagedHandle> {
    object
        .as_class::<HandleCell>()
        .map(|cell| cell.borrow().handle().clone())
}
