//! Import resolution.
//!
//! The interface between the shim and whatever binds host functions to a
//! guest module's imports:
//!
//! - `Signature`, the compact type-signature strings of the linkage table,
//!   e.g. `i(Riii*)`.
//! - `ModuleLinker`, the `register(module, name, signature, function)`
//!   primitive an embedding runtime provides.
//! - `ImportTable`, a `ModuleLinker` over a module's declared imports that
//!   also dispatches guest calls to the bound host functions.
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
    errno::ErrNo,
    memory::MemoryHandler,
    wasi::common::{FatalShimError, WasiShim},
};
use err_derive::Error;
use std::{fmt, str::FromStr};

////////////////////////////////////////////////////////////////////////////////
// Values and types.
////////////////////////////////////////////////////////////////////////////////

/// The wasm value types a host function can take or return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

/// A decoded guest scalar, as handed to a host function by the runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub fn ty(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
        }
    }
}

/// A function type as seen by the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncType {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
}

impl FuncType {
    pub fn new(params: &[ValueType], results: &[ValueType]) -> Self {
        Self {
            params: params.to_vec(),
            results: results.to_vec(),
        }
    }
}

/// What a host call hands back to the runtime's call loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCallOutcome {
    /// The call completed; the guest receives this error code.
    Return(ErrNo),
    /// The guest asked to exit with this code.  The runtime must stop
    /// executing it.
    Exit(u32),
}

impl HostCallOutcome {
    /// The values pushed back to the guest.
    pub fn results(&self) -> Vec<Value> {
        match self {
            HostCallOutcome::Return(errno) => vec![Value::I32(errno.code() as i32)],
            HostCallOutcome::Exit(_) => Vec::new(),
        }
    }
}

/// A host function with the uniform calling convention used by the linkage
/// table: the shim state, the guest memory (if the runtime has one) and the
/// decoded scalar arguments.
pub type HostFunction =
    fn(&mut WasiShim, Option<&mut dyn MemoryHandler>, &[Value]) -> Result<HostCallOutcome, FatalShimError>;

////////////////////////////////////////////////////////////////////////////////
// Signatures.
////////////////////////////////////////////////////////////////////////////////

/// One parameter of a host function signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// A guest scalar.
    Value(ValueType),
    /// A guest memory offset; an `i32` to the guest.
    Pointer,
    /// The runtime handle.  Supplied by the runtime, invisible to the guest.
    Runtime,
}

/// A host function signature written as `r(p...)`: `r` is one of `v`
/// (nothing), `i`, `I`, `f`, `F`; each `p` is one of `i`, `I`, `f`, `F`,
/// `*` (memory offset) or `R` (runtime handle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    result: Option<ValueType>,
    params: Vec<Param>,
}

fn value_type(c: char) -> Option<ValueType> {
    match c {
        'i' => Some(ValueType::I32),
        'I' => Some(ValueType::I64),
        'f' => Some(ValueType::F32),
        'F' => Some(ValueType::F64),
        _ => None,
    }
}

fn type_char(ty: ValueType) -> char {
    match ty {
        ValueType::I32 => 'i',
        ValueType::I64 => 'I',
        ValueType::F32 => 'f',
        ValueType::F64 => 'F',
    }
}

impl Signature {
    pub fn parse(text: &str) -> Result<Self, LinkError> {
        let malformed = || LinkError::MalformedSignature(text.to_string());
        let mut chars = text.chars();
        let result = match chars.next().ok_or_else(malformed)? {
            'v' => None,
            c => Some(value_type(c).ok_or_else(malformed)?),
        };
        if chars.next() != Some('(') {
            return Err(malformed());
        }
        let body = chars.as_str().strip_suffix(')').ok_or_else(malformed)?;

        let mut params = Vec::with_capacity(body.len());
        for c in body.chars() {
            let param = match c {
                'R' if !params.contains(&Param::Runtime) => Param::Runtime,
                '*' => Param::Pointer,
                c => Param::Value(value_type(c).ok_or_else(malformed)?),
            };
            params.push(param);
        }
        Ok(Self { result, params })
    }

    pub fn result(&self) -> Option<ValueType> {
        self.result
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// The type the guest must import this function at.
    pub fn func_type(&self) -> FuncType {
        FuncType {
            params: self
                .params
                .iter()
                .filter_map(|p| match p {
                    Param::Value(ty) => Some(*ty),
                    Param::Pointer => Some(ValueType::I32),
                    Param::Runtime => None,
                })
                .collect(),
            results: self.result.into_iter().collect(),
        }
    }
}

impl FromStr for Signature {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signature::parse(s)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.result.map(type_char).unwrap_or('v');
        write!(f, "{}(", result)?;
        for param in self.params.iter() {
            let c = match param {
                Param::Value(ty) => type_char(*ty),
                Param::Pointer => '*',
                Param::Runtime => 'R',
            };
            write!(f, "{}", c)?;
        }
        write!(f, ")")
    }
}

////////////////////////////////////////////////////////////////////////////////
// Linking.
////////////////////////////////////////////////////////////////////////////////

/// Failures while binding host functions to a module's imports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The module does not import this function.
    #[error(display = "LinkError: function '{}.{}' is not imported.", module, name)]
    FunctionLookupFailed { module: String, name: String },
    /// The module imports this function at a different type.
    #[error(
        display = "LinkError: signature mismatch for '{}': expected {:?}, found {:?}.",
        name,
        expected,
        found
    )]
    SignatureMismatch {
        name: String,
        expected: FuncType,
        found: FuncType,
    },
    /// A signature string that does not follow the grammar.
    #[error(display = "LinkError: malformed signature '{}'.", _0)]
    MalformedSignature(String),
    /// The import has already been bound.
    #[error(display = "LinkError: '{}.{}' is already defined.", module, name)]
    DuplicateDefinition { module: String, name: String },
}

/// Binds host functions to a module's imports.  Implemented by the embedding
/// runtime, or by `ImportTable`.
pub trait ModuleLinker {
    /// Binds `function` to the import `module.name`.  Returns
    /// `LinkError::FunctionLookupFailed` if the module has no such import.
    fn link_function(
        &mut self,
        module: &str,
        name: &str,
        signature: &Signature,
        function: HostFunction,
    ) -> Result<(), LinkError>;
}

/// One declared import of a module, and the host function bound to it.
#[derive(Clone)]
struct Import {
    module: String,
    name: String,
    ty: FuncType,
    binding: Option<HostFunction>,
}

/// The imports a guest module declares, and the host functions bound to them.
#[derive(Clone, Default)]
pub struct ImportTable {
    imports: Vec<Import>,
}

impl ImportTable {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that the module imports `module.name` at type `ty`.
    pub fn declare(mut self, module: &str, name: &str, ty: FuncType) -> Self {
        self.imports.push(Import {
            module: module.to_string(),
            name: name.to_string(),
            ty,
            binding: None,
        });
        self
    }

    /// The imports nothing has been bound to yet.
    pub fn unresolved(&self) -> Vec<(&str, &str)> {
        self.imports
            .iter()
            .filter(|import| import.binding.is_none())
            .map(|import| (import.module.as_str(), import.name.as_str()))
            .collect()
    }

    /// Dispatches a guest call of `module.name` to its bound host function.
    pub fn call(
        &self,
        module: &str,
        name: &str,
        shim: &mut WasiShim,
        memory: Option<&mut dyn MemoryHandler>,
        args: &[Value],
    ) -> Result<HostCallOutcome, FatalShimError> {
        let function = self
            .imports
            .iter()
            .find(|import| import.module == module && import.name == name)
            .and_then(|import| import.binding)
            .ok_or_else(|| FatalShimError::UnknownHostFunction(format!("{}.{}", module, name)))?;
        function(shim, memory, args)
    }
}

impl ModuleLinker for ImportTable {
    fn link_function(
        &mut self,
        module: &str,
        name: &str,
        signature: &Signature,
        function: HostFunction,
    ) -> Result<(), LinkError> {
        let import = self
            .imports
            .iter_mut()
            .find(|import| import.module == module && import.name == name)
            .ok_or_else(|| LinkError::FunctionLookupFailed {
                module: module.to_string(),
                name: name.to_string(),
            })?;
        let expected = signature.func_type();
        if import.ty != expected {
            return Err(LinkError::SignatureMismatch {
                name: name.to_string(),
                expected,
                found: import.ty.clone(),
            });
        }
        if import.binding.is_some() {
            return Err(LinkError::DuplicateDefinition {
                module: module.to_string(),
                name: name.to_string(),
            });
        }
        import.binding = Some(function);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ValueType::*;

    #[test]
    fn signatures_parse_and_print() {
        for text in ["i(R**)", "i(Riii*)", "i(RiIi*)", "v(i)", "i(i)", "F()", "i(*i)"] {
            assert_eq!(Signature::parse(text).unwrap().to_string(), text);
        }
    }

    #[test]
    fn runtime_handle_is_invisible_to_the_guest() {
        let signature: Signature = "i(RiI*)".parse().unwrap();
        assert_eq!(signature.func_type(), FuncType::new(&[I32, I64, I32], &[I32]));
        assert_eq!(
            Signature::parse("v(i)").unwrap().func_type(),
            FuncType::new(&[I32], &[])
        );
    }

    #[test]
    fn malformed_signatures_are_refused() {
        for text in ["", "i", "x(i)", "i(i", "i(q)", "i(RR)", "ii(i)"] {
            assert_eq!(
                Signature::parse(text),
                Err(LinkError::MalformedSignature(text.to_string()))
            );
        }
    }

    fn nop(
        _: &mut WasiShim,
        _: Option<&mut dyn MemoryHandler>,
        _: &[Value],
    ) -> Result<HostCallOutcome, FatalShimError> {
        Ok(HostCallOutcome::Return(ErrNo::Success))
    }

    #[test]
    fn import_table_binds_by_name_and_type() {
        let mut table = ImportTable::new()
            .declare("env", "f", FuncType::new(&[I32], &[I32]))
            .declare("env", "g", FuncType::new(&[I64], &[I32]));
        let signature = Signature::parse("i(Ri)").unwrap();

        assert_eq!(table.link_function("env", "f", &signature, nop), Ok(()));
        assert!(matches!(
            table.link_function("env", "g", &signature, nop),
            Err(LinkError::SignatureMismatch { .. })
        ));
        assert!(matches!(
            table.link_function("env", "h", &signature, nop),
            Err(LinkError::FunctionLookupFailed { .. })
        ));
        assert!(matches!(
            table.link_function("env", "f", &signature, nop),
            Err(LinkError::DuplicateDefinition { .. })
        ));
        assert_eq!(table.unresolved(), vec![("env", "g")]);
    }

    #[test]
    fn calls_reach_only_bound_imports() {
        let mut table = ImportTable::new().declare("env", "f", FuncType::new(&[], &[I32]));
        let mut shim = WasiShim::default();
        assert!(matches!(
            table.call("env", "f", &mut shim, None, &[]),
            Err(FatalShimError::UnknownHostFunction(_))
        ));
        table
            .link_function("env", "f", &Signature::parse("i()").unwrap(), nop)
            .unwrap();
        assert_eq!(
            table.call("env", "f", &mut shim, None, &[]).unwrap(),
            HostCallOutcome::Return(ErrNo::Success)
        );
        assert_eq!(
            HostCallOutcome::Return(ErrNo::BadF).results(),
            vec![Value::I32(8)]
        );
    }
}
