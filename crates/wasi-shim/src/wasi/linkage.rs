//! The WASI linkage table.
//!
//! Each supported WASI call is bound, under both `wasi_unstable` and
//! `wasi_snapshot_preview1`, to an adaptor with the uniform `HostFunction`
//! calling convention.  An adaptor decodes and type-checks the scalar
//! arguments, runs the handler on `WasiShim`, traces the call if asked to and
//! converts the outcome into what is pushed back to the guest.
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
    errno::{ErrNo, ShimResult},
    linker::{HostCallOutcome, HostFunction, LinkError, ModuleLinker, Signature, Value},
    memory::MemoryHandler,
    strace::Strace,
    wasi::common::{FatalShimError, WasiAPIName, WasiShim},
};
use log::debug;

/// The import modules the WASI calls are provided under.
pub const WASI_MODULE_NAMES: [&str; 2] = ["wasi_unstable", "wasi_snapshot_preview1"];

/// One row of the linkage table.
#[derive(Clone, Copy)]
pub struct HostImport {
    pub name: WasiAPIName,
    /// The compact signature, see `Signature`.
    pub signature: &'static str,
    pub function: HostFunction,
}

/// Every WASI call the shim provides.
pub static WASI_IMPORTS: &[HostImport] = &[
    HostImport {
        name: WasiAPIName::ARGS_SIZES_GET,
        signature: "i(R**)",
        function: wasi_args_sizes_get,
    },
    HostImport {
        name: WasiAPIName::ARGS_GET,
        signature: "i(R**)",
        function: wasi_args_get,
    },
    HostImport {
        name: WasiAPIName::ENVIRON_SIZES_GET,
        signature: "i(Rii)",
        function: wasi_environ_sizes_get,
    },
    HostImport {
        name: WasiAPIName::ENVIRON_GET,
        signature: "i(Rii)",
        function: wasi_environ_get,
    },
    HostImport {
        name: WasiAPIName::FD_PRESTAT_GET,
        signature: "i(Rii)",
        function: wasi_fd_prestat_get,
    },
    HostImport {
        name: WasiAPIName::FD_PRESTAT_DIR_NAME,
        signature: "i(Riii)",
        function: wasi_fd_prestat_dir_name,
    },
    HostImport {
        name: WasiAPIName::FD_FDSTAT_GET,
        signature: "i(Ri*)",
        function: wasi_fd_fdstat_get,
    },
    HostImport {
        name: WasiAPIName::FD_SEEK,
        signature: "i(RiIi*)",
        function: wasi_fd_seek,
    },
    HostImport {
        name: WasiAPIName::FD_READ,
        signature: "i(Riii*)",
        function: wasi_fd_read,
    },
    HostImport {
        name: WasiAPIName::FD_WRITE,
        signature: "i(Riii*)",
        function: wasi_fd_write,
    },
    HostImport {
        name: WasiAPIName::FD_CLOSE,
        signature: "i(i)",
        function: wasi_fd_close,
    },
    HostImport {
        name: WasiAPIName::FD_DATASYNC,
        signature: "i(i)",
        function: wasi_fd_datasync,
    },
    HostImport {
        name: WasiAPIName::RANDOM_GET,
        signature: "i(*i)",
        function: wasi_random_get,
    },
    HostImport {
        name: WasiAPIName::CLOCK_RES_GET,
        signature: "i(Ri*)",
        function: wasi_clock_res_get,
    },
    HostImport {
        name: WasiAPIName::CLOCK_TIME_GET,
        signature: "i(RiI*)",
        function: wasi_clock_time_get,
    },
    HostImport {
        name: WasiAPIName::PROC_EXIT,
        signature: "v(i)",
        function: wasi_proc_exit,
    },
];

/// Binds every WASI call the module imports through `linker`.  Calls the
/// module does not import are skipped; any other failure aborts linking.
pub fn link_wasi<L: ModuleLinker + ?Sized>(linker: &mut L) -> Result<(), LinkError> {
    for import in WASI_IMPORTS.iter() {
        let signature = Signature::parse(import.signature)?;
        let name: &'static str = import.name.into();
        for module in WASI_MODULE_NAMES.iter() {
            match linker.link_function(module, name, &signature, import.function) {
                Ok(()) => debug!("linked {}.{}", module, name),
                Err(LinkError::FunctionLookupFailed { .. }) => (),
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////
// Argument decoding.
////////////////////////////////////////////////////////////////////////////////

/// The scalar arguments of one call, checked against the handler's arity.
struct Args<'a> {
    function_name: WasiAPIName,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    fn check(function_name: WasiAPIName, values: &'a [Value], expected: usize) -> Result<Self, FatalShimError> {
        if values.len() != expected {
            return Err(FatalShimError::BadArgumentsToHostFunction { function_name });
        }
        Ok(Self { function_name, values })
    }

    #[inline]
    fn bad(&self) -> FatalShimError {
        FatalShimError::BadArgumentsToHostFunction {
            function_name: self.function_name,
        }
    }

    /// The `index`th argument as an `i32`, reinterpreted as unsigned.
    fn u32(&self, index: usize) -> Result<u32, FatalShimError> {
        match self.values.get(index) {
            Some(Value::I32(v)) => Ok(*v as u32),
            _ => Err(self.bad()),
        }
    }

    fn i64(&self, index: usize) -> Result<i64, FatalShimError> {
        match self.values.get(index) {
            Some(Value::I64(v)) => Ok(*v),
            _ => Err(self.bad()),
        }
    }

    fn u64(&self, index: usize) -> Result<u64, FatalShimError> {
        self.i64(index).map(|v| v as u64)
    }
}

/// Handlers touching guest memory cannot run without one.
macro_rules! memory_or_inval {
    ($memory:expr) => {
        match $memory {
            Some(memory) => memory,
            None => return Ok(HostCallOutcome::Return(ErrNo::Inval)),
        }
    };
}

#[inline]
fn finish(result: ShimResult<()>) -> Result<HostCallOutcome, FatalShimError> {
    Ok(HostCallOutcome::Return(match result {
        Ok(()) => ErrNo::Success,
        Err(errno) => errno,
    }))
}

////////////////////////////////////////////////////////////////////////////////
// Adaptors.
////////////////////////////////////////////////////////////////////////////////

fn wasi_args_sizes_get(
    shim: &mut WasiShim,
    memory: Option<&mut dyn MemoryHandler>,
    args: &[Value],
) -> Result<HostCallOutcome, FatalShimError> {
    let args = Args::check(WasiAPIName::ARGS_SIZES_GET, args, 2)?;
    let (argc_address, size_address) = (args.u32(0)?, args.u32(1)?);
    let memory = memory_or_inval!(memory);
    let result = shim.args_sizes_get(&mut *memory, argc_address, size_address);
    let mut strace = Strace::func(shim.strace_enabled(), "args_sizes_get");
    strace.arg_p_u32(&result, &mut *memory, argc_address);
    strace.arg_p_u32(&result, &mut *memory, size_address);
    finish(strace.result(result))
}

fn wasi_args_get(
    shim: &mut WasiShim,
    memory: Option<&mut dyn MemoryHandler>,
    args: &[Value],
) -> Result<HostCallOutcome, FatalShimError> {
    let args = Args::check(WasiAPIName::ARGS_GET, args, 2)?;
    let (argv_address, buf_address) = (args.u32(0)?, args.u32(1)?);
    let memory = memory_or_inval!(memory);
    let result = shim.args_get(&mut *memory, argv_address, buf_address);
    let mut strace = Strace::func(shim.strace_enabled(), "args_get");
    strace.arg_hex(argv_address);
    strace.arg_hex(buf_address);
    finish(strace.result(result))
}

fn wasi_environ_sizes_get(
    shim: &mut WasiShim,
    memory: Option<&mut dyn MemoryHandler>,
    args: &[Value],
) -> Result<HostCallOutcome, FatalShimError> {
    let args = Args::check(WasiAPIName::ENVIRON_SIZES_GET, args, 2)?;
    let (count_address, size_address) = (args.u32(0)?, args.u32(1)?);
    let memory = memory_or_inval!(memory);
    let result = shim.environ_sizes_get(&mut *memory, count_address, size_address);
    let mut strace = Strace::func(shim.strace_enabled(), "environ_sizes_get");
    strace.arg_p_u32(&result, &mut *memory, count_address);
    strace.arg_p_u32(&result, &mut *memory, size_address);
    finish(strace.result(result))
}

fn wasi_environ_get(
    shim: &mut WasiShim,
    memory: Option<&mut dyn MemoryHandler>,
    args: &[Value],
) -> Result<HostCallOutcome, FatalShimError> {
    let args = Args::check(WasiAPIName::ENVIRON_GET, args, 2)?;
    let (environ_address, buf_address) = (args.u32(0)?, args.u32(1)?);
    let memory = memory_or_inval!(memory);
    let result = shim.environ_get(&mut *memory, environ_address, buf_address);
    let mut strace = Strace::func(shim.strace_enabled(), "environ_get");
    strace.arg_hex(environ_address);
    strace.arg_hex(buf_address);
    finish(strace.result(result))
}

fn wasi_fd_prestat_get(
    shim: &mut WasiShim,
    memory: Option<&mut dyn MemoryHandler>,
    args: &[Value],
) -> Result<HostCallOutcome, FatalShimError> {
    let args = Args::check(WasiAPIName::FD_PRESTAT_GET, args, 2)?;
    let (fd, address) = (args.u32(0)?, args.u32(1)?);
    let memory = memory_or_inval!(memory);
    let result = shim.fd_prestat_get(&mut *memory, fd, address);
    let mut strace = Strace::func(shim.strace_enabled(), "fd_prestat_get");
    strace.arg_dec(fd);
    strace.arg_hex(address);
    finish(strace.result(result))
}

fn wasi_fd_prestat_dir_name(
    shim: &mut WasiShim,
    memory: Option<&mut dyn MemoryHandler>,
    args: &[Value],
) -> Result<HostCallOutcome, FatalShimError> {
    let args = Args::check(WasiAPIName::FD_PRESTAT_DIR_NAME, args, 3)?;
    let (fd, address, size) = (args.u32(0)?, args.u32(1)?, args.u32(2)?);
    let memory = memory_or_inval!(memory);
    let result = shim.fd_prestat_dir_name(&mut *memory, fd, address, size);
    let mut strace = Strace::func(shim.strace_enabled(), "fd_prestat_dir_name");
    strace.arg_dec(fd);
    if result.is_ok() {
        strace.arg_buffer(&mut *memory, address, size);
    } else {
        strace.arg_hex(address);
    }
    strace.arg_dec(size);
    finish(strace.result(result))
}

fn wasi_fd_fdstat_get(
    shim: &mut WasiShim,
    memory: Option<&mut dyn MemoryHandler>,
    args: &[Value],
) -> Result<HostCallOutcome, FatalShimError> {
    let args = Args::check(WasiAPIName::FD_FDSTAT_GET, args, 2)?;
    let (fd, address) = (args.u32(0)?, args.u32(1)?);
    let memory = memory_or_inval!(memory);
    let result = shim.fd_fdstat_get(&mut *memory, fd, address);
    let mut strace = Strace::func(shim.strace_enabled(), "fd_fdstat_get");
    strace.arg_dec(fd);
    strace.arg_dots();
    finish(strace.result(result))
}

fn wasi_fd_seek(
    shim: &mut WasiShim,
    memory: Option<&mut dyn MemoryHandler>,
    args: &[Value],
) -> Result<HostCallOutcome, FatalShimError> {
    let args = Args::check(WasiAPIName::FD_SEEK, args, 4)?;
    let (fd, offset, whence, address) = (args.u32(0)?, args.i64(1)?, args.u32(2)?, args.u32(3)?);
    let memory = memory_or_inval!(memory);
    let result = shim.fd_seek(&mut *memory, fd, offset, whence, address);
    let mut strace = Strace::func(shim.strace_enabled(), "fd_seek");
    strace.arg_dec(fd);
    strace.arg_dec(offset);
    strace.arg_dec(whence);
    strace.arg_p_u64(&result, &mut *memory, address);
    finish(strace.result(result))
}

fn wasi_fd_read(
    shim: &mut WasiShim,
    memory: Option<&mut dyn MemoryHandler>,
    args: &[Value],
) -> Result<HostCallOutcome, FatalShimError> {
    let args = Args::check(WasiAPIName::FD_READ, args, 4)?;
    let (fd, iovs, count, address) = (args.u32(0)?, args.u32(1)?, args.u32(2)?, args.u32(3)?);
    let memory = memory_or_inval!(memory);
    let result = shim.fd_read(&mut *memory, fd, iovs, count, address);
    let mut strace = Strace::func(shim.strace_enabled(), "fd_read");
    strace.arg_dec(fd);
    strace.arg_iovec(&result, &mut *memory, iovs, count, address);
    strace.arg_dec(count);
    strace.arg_p_u32(&result, &mut *memory, address);
    finish(strace.result(result))
}

fn wasi_fd_write(
    shim: &mut WasiShim,
    memory: Option<&mut dyn MemoryHandler>,
    args: &[Value],
) -> Result<HostCallOutcome, FatalShimError> {
    let args = Args::check(WasiAPIName::FD_WRITE, args, 4)?;
    let (fd, iovs, count, address) = (args.u32(0)?, args.u32(1)?, args.u32(2)?, args.u32(3)?);
    let memory = memory_or_inval!(memory);
    let result = shim.fd_write(&mut *memory, fd, iovs, count, address);
    let mut strace = Strace::func(shim.strace_enabled(), "fd_write");
    strace.arg_dec(fd);
    strace.arg_iovec(&result, &mut *memory, iovs, count, address);
    strace.arg_dec(count);
    strace.arg_p_u32(&result, &mut *memory, address);
    finish(strace.result(result))
}

fn wasi_fd_close(
    shim: &mut WasiShim,
    _memory: Option<&mut dyn MemoryHandler>,
    args: &[Value],
) -> Result<HostCallOutcome, FatalShimError> {
    let args = Args::check(WasiAPIName::FD_CLOSE, args, 1)?;
    let fd = args.u32(0)?;
    let result = shim.fd_close(fd);
    let mut strace = Strace::func(shim.strace_enabled(), "fd_close");
    strace.arg_dec(fd);
    finish(strace.result(result))
}

fn wasi_fd_datasync(
    shim: &mut WasiShim,
    _memory: Option<&mut dyn MemoryHandler>,
    args: &[Value],
) -> Result<HostCallOutcome, FatalShimError> {
    let args = Args::check(WasiAPIName::FD_DATASYNC, args, 1)?;
    let fd = args.u32(0)?;
    let result = shim.fd_datasync(fd);
    let mut strace = Strace::func(shim.strace_enabled(), "fd_datasync");
    strace.arg_dec(fd);
    finish(strace.result(result))
}

fn wasi_random_get(
    shim: &mut WasiShim,
    memory: Option<&mut dyn MemoryHandler>,
    args: &[Value],
) -> Result<HostCallOutcome, FatalShimError> {
    let args = Args::check(WasiAPIName::RANDOM_GET, args, 2)?;
    let (address, length) = (args.u32(0)?, args.u32(1)?);
    let memory = memory_or_inval!(memory);
    let result = shim.random_get(&mut *memory, address, length);
    let mut strace = Strace::func(shim.strace_enabled(), "random_get");
    strace.arg_dots();
    strace.arg_dec(length);
    finish(strace.result(result))
}

fn wasi_clock_res_get(
    shim: &mut WasiShim,
    memory: Option<&mut dyn MemoryHandler>,
    args: &[Value],
) -> Result<HostCallOutcome, FatalShimError> {
    let args = Args::check(WasiAPIName::CLOCK_RES_GET, args, 2)?;
    let (clock_id, address) = (args.u32(0)?, args.u32(1)?);
    let memory = memory_or_inval!(memory);
    let result = shim.clock_res_get(&mut *memory, clock_id, address);
    let mut strace = Strace::func(shim.strace_enabled(), "clock_res_get");
    strace.arg_dec(clock_id);
    strace.arg_p_u64(&result, &mut *memory, address);
    finish(strace.result(result))
}

fn wasi_clock_time_get(
    shim: &mut WasiShim,
    memory: Option<&mut dyn MemoryHandler>,
    args: &[Value],
) -> Result<HostCallOutcome, FatalShimError> {
    let args = Args::check(WasiAPIName::CLOCK_TIME_GET, args, 3)?;
    let (clock_id, precision, address) = (args.u32(0)?, args.u64(1)?, args.u32(2)?);
    let memory = memory_or_inval!(memory);
    let result = shim.clock_time_get(&mut *memory, clock_id, precision, address);
    let mut strace = Strace::func(shim.strace_enabled(), "clock_time_get");
    strace.arg_dec(clock_id);
    strace.arg_dec(precision);
    strace.arg_p_u64(&result, &mut *memory, address);
    finish(strace.result(result))
}

fn wasi_proc_exit(
    shim: &mut WasiShim,
    _memory: Option<&mut dyn MemoryHandler>,
    args: &[Value],
) -> Result<HostCallOutcome, FatalShimError> {
    let args = Args::check(WasiAPIName::PROC_EXIT, args, 1)?;
    let exit_code = args.u32(0)?;
    let mut strace = Strace::func(shim.strace_enabled(), "proc_exit");
    strace.arg_dec(exit_code);
    strace.no_return();
    Ok(shim.proc_exit(exit_code))
}
