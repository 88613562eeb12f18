//! Interop tour: native data, managed handles, and a script working on both
//!
//! **This shows:**
//! - Native collections converted to script values and back
//! - A native object handed to script code as an opaque handle
//! - A native callback recovering the handle's original type

use std::sync::Mutex;

use latch_interop::{ManagedHandle, NativeArray, NativeDictionary, NativeObject};
use latch_script::{ScriptError, ScriptRuntime, ScriptValue};
use serde_json::json;

/// Native state the script may only touch through callbacks.
struct Inventory {
    items: Mutex<Vec<String>>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Interop tour ===\n");

    let mut runtime = ScriptRuntime::new()?;

    runtime.register_function("addItem", |args| {
        let inventory = args
            .first()
            .and_then(ScriptValue::as_handle)
            .ok_or_else(|| ScriptError::exception("addItem expects an inventory"))?
            .unwrap::<Inventory>()?;
        let name = args
            .get(1)
            .and_then(ScriptValue::as_dynamic)
            .and_then(|value| value.as_str())
            .ok_or_else(|| ScriptError::exception("addItem expects a name"))?;

        let mut items = inventory
            .items
            .lock()
            .map_err(|_| ScriptError::exception("inventory poisoned"))?;
        items.push(name.to_string());
        Ok(json!(items.len()).into())
    })?;

    runtime.evaluate(
        r#"
        function restock(inventory, order) {
            let count = 0;
            for (const name of order.items) {
                count = addItem(inventory, name);
            }
            return { owner: order.owner, count };
        }
        "#,
    )?;

    println!("1. Building a native order...");
    let mut items = NativeArray::new();
    items.push("sword");
    items.push("shield");
    let mut order = NativeDictionary::new();
    order.insert("owner", "ada");
    order.insert("items", items);
    let order = ScriptValue::from_native(&NativeObject::from(order))?;

    println!("2. Handing the inventory to the script as a handle...");
    let inventory = ManagedHandle::wrap(Inventory {
        items: Mutex::new(Vec::new()),
    });
    let result = runtime.invoke("restock", vec![inventory.clone().into(), order])?;
    println!("   script returned {:?}", result.as_dynamic());

    println!("3. Reading native state back...");
    let stored = inventory
        .unwrap::<Inventory>()?
        .items
        .lock()
        .map_err(|_| "inventory poisoned")?
        .clone();
    println!("   inventory now holds {stored:?}");

    println!("4. A script failure stays a structured error...");
    match runtime.evaluate("restock(null, { items: ['x'] })") {
        Err(ScriptError::ScriptException { message, .. }) => println!("   caught: {message}"),
        other => println!("   unexpected: {other:?}"),
    }

    runtime.dispose();
    println!("\n=== Tour complete ===");
    Ok(())
}
