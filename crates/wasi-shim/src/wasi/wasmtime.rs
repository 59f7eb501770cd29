//! Wasmtime embedding of the shim.
//!
//! Implements `ModuleLinker` for `wasmtime::Linker<WasiShim>`, so that
//! `link_wasi` binds the WASI calls straight into a Wasmtime linker, and
//! provides `run_program` to execute a WASI command module to completion.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::{
    linker::{HostCallOutcome, HostFunction, LinkError, ModuleLinker, Signature, Value, ValueType},
    memory::{GuestMemory, MemoryHandler},
    options::Options,
    wasi::{
        common::{FatalShimError, WasiShim},
        linkage::link_wasi,
    },
};
use anyhow::{anyhow, Result};
use log::info;
use wasmtime::{Caller, Engine, Extern, FuncType, Linker, Module, Store, Val, ValType};

fn to_val_type(ty: &ValueType) -> ValType {
    match ty {
        ValueType::I32 => ValType::I32,
        ValueType::I64 => ValType::I64,
        ValueType::F32 => ValType::F32,
        ValueType::F64 => ValType::F64,
    }
}

fn from_val(val: &Val) -> Option<Value> {
    match val {
        Val::I32(v) => Some(Value::I32(*v)),
        Val::I64(v) => Some(Value::I64(*v)),
        Val::F32(bits) => Some(Value::F32(f32::from_bits(*bits))),
        Val::F64(bits) => Some(Value::F64(f64::from_bits(*bits))),
        _ => None,
    }
}

fn to_val(value: &Value) -> Val {
    match value {
        Value::I32(v) => Val::I32(*v),
        Value::I64(v) => Val::I64(*v),
        Value::F32(v) => Val::F32(v.to_bits()),
        Value::F64(v) => Val::F64(v.to_bits()),
    }
}

/// Runs `function` for a guest call coming through Wasmtime, lending it the
/// caller's exported linear memory if there is one.
fn call_host_function(
    function: HostFunction,
    mut caller: Caller<'_, WasiShim>,
    params: &[Val],
    results: &mut [Val],
) -> Result<()> {
    let args = params
        .iter()
        .map(from_val)
        .collect::<Option<Vec<Value>>>()
        .ok_or_else(|| anyhow!("reference value passed to a WASI call"))?;

    let outcome = match caller
        .get_export(WasiShim::LINEAR_MEMORY_NAME)
        .and_then(Extern::into_memory)
    {
        Some(memory) => {
            let (region, shim) = memory.data_and_store_mut(&mut caller);
            let mut region = GuestMemory(region);
            function(shim, Some(&mut region as &mut dyn MemoryHandler), &args)?
        }
        None => function(caller.data_mut(), None, &args)?,
    };

    match outcome {
        HostCallOutcome::Return(_) => {
            for (slot, value) in results.iter_mut().zip(outcome.results().iter()) {
                *slot = to_val(value);
            }
            Ok(())
        }
        // Unwind out of the guest; `run_program` recognises the error.
        HostCallOutcome::Exit(code) => Err(anyhow::Error::new(FatalShimError::GuestExit(code))),
    }
}

impl ModuleLinker for Linker<WasiShim> {
    fn link_function(
        &mut self,
        module: &str,
        name: &str,
        signature: &Signature,
        function: HostFunction,
    ) -> Result<(), LinkError> {
        let ty = signature.func_type();
        let func_type = FuncType::new(
            ty.params.iter().map(to_val_type),
            ty.results.iter().map(to_val_type),
        );
        self.func_new(module, name, func_type, move |caller, params, results| {
            call_host_function(function, caller, params, results)
        })
        .map(|_| ())
        .map_err(|_| LinkError::DuplicateDefinition {
            module: module.to_string(),
            name: name.to_string(),
        })
    }
}

/// Compiles `binary`, links the WASI calls, and runs its `_start` entry
/// point.  Returns the code the program passed to `proc_exit`, or 0 if it
/// returned normally.
pub fn run_program(binary: &[u8], options: Options) -> Result<u32> {
    options.validate()?;
    let engine = Engine::default();
    let module = Module::new(&engine, binary)?;
    let mut linker = Linker::new(&engine);
    link_wasi(&mut linker)?;

    let mut store = Store::new(&engine, WasiShim::new(options));
    let instance = linker.instantiate(&mut store, &module)?;
    let start = instance.get_typed_func::<(), ()>(&mut store, WasiShim::ENTRY_POINT_NAME)?;

    match start.call(&mut store, ()) {
        Ok(()) => Ok(0),
        Err(e) => match e.downcast_ref::<FatalShimError>() {
            Some(FatalShimError::GuestExit(code)) => {
                info!("program exited through proc_exit({})", code);
                Ok(*code)
            }
            _ => Err(e),
        },
    }
}
