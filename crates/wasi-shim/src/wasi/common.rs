//! Common code for the WASI host calls.
//!
//! The `WasiShim` owns the state of one guest program (its arguments, its
//! preopens, its entropy source) and implements every supported WASI call
//! against the host operating system.  Handlers take the guest memory as an
//! explicit `MemoryHandler` and return a `ShimResult`; converting those into
//! what a runtime pushes back to the guest is the job of `linkage`.
//!
//! Descriptors are passed straight through to the host: a guest `fd` is the
//! host file descriptor with the same number.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

#![allow(non_camel_case_types)]

use crate::{
    errno::{errno_to_wasi, ErrNo, ShimResult},
    linker::{HostCallOutcome, LinkError},
    memory::{split_iovecs_mut, HostIoVec, MemoryHandler},
    options::Options,
    preopen::{PreopenTable, PREOPENTYPE_DIR},
    random::{fill_random, EntropySource, OsEntropy},
};
use byteorder::{ByteOrder, LittleEndian};
use cfg_if::cfg_if;
use err_derive::Error;
use log::{debug, info};
use nix::{
    fcntl::{fcntl, FcntlArg, OFlag},
    sys::{
        stat::{fstat, SFlag},
        time::TimeSpec,
        uio::{readv, writev},
    },
    time::{clock_getres, clock_gettime, ClockId as HostClockId},
    unistd,
};
use num_traits::FromPrimitive;
use std::{
    convert::TryFrom,
    io::{IoSlice, IoSliceMut},
    os::unix::io::RawFd,
};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

////////////////////////////////////////////////////////////////////////////////
// Common constants.
////////////////////////////////////////////////////////////////////////////////

/// List of WASI API.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, Hash, FromPrimitive, ToPrimitive, EnumString, IntoStaticStr, EnumIter, Display,
)]
pub enum WasiAPIName {
    #[strum(serialize = "args_get")]
    ARGS_GET = 1,
    #[strum(serialize = "args_sizes_get")]
    ARGS_SIZES_GET,
    #[strum(serialize = "environ_get")]
    ENVIRON_GET,
    #[strum(serialize = "environ_sizes_get")]
    ENVIRON_SIZES_GET,
    #[strum(serialize = "fd_prestat_get")]
    FD_PRESTAT_GET,
    #[strum(serialize = "fd_prestat_dir_name")]
    FD_PRESTAT_DIR_NAME,
    #[strum(serialize = "fd_fdstat_get")]
    FD_FDSTAT_GET,
    #[strum(serialize = "fd_seek")]
    FD_SEEK,
    #[strum(serialize = "fd_read")]
    FD_READ,
    #[strum(serialize = "fd_write")]
    FD_WRITE,
    #[strum(serialize = "fd_close")]
    FD_CLOSE,
    #[strum(serialize = "fd_datasync")]
    FD_DATASYNC,
    #[strum(serialize = "random_get")]
    RANDOM_GET,
    #[strum(serialize = "clock_res_get")]
    CLOCK_RES_GET,
    #[strum(serialize = "clock_time_get")]
    CLOCK_TIME_GET,
    #[strum(serialize = "proc_exit")]
    PROC_EXIT,
}

/// The `whence` argument of `fd_seek`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum Whence {
    Set = 0,
    Cur = 1,
    End = 2,
}

impl Whence {
    fn to_host(self) -> unistd::Whence {
        match self {
            Whence::Set => unistd::Whence::SeekSet,
            Whence::Cur => unistd::Whence::SeekCur,
            Whence::End => unistd::Whence::SeekEnd,
        }
    }
}

/// The WASI clock identifiers.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum ClockId {
    RealTime = 0,
    Monotonic = 1,
    ProcessCpuTime = 2,
    ThreadCpuTime = 3,
}

impl ClockId {
    fn to_host(self) -> HostClockId {
        match self {
            ClockId::RealTime => HostClockId::CLOCK_REALTIME,
            ClockId::Monotonic => HostClockId::CLOCK_MONOTONIC,
            ClockId::ProcessCpuTime => HostClockId::CLOCK_PROCESS_CPUTIME_ID,
            ClockId::ThreadCpuTime => HostClockId::CLOCK_THREAD_CPUTIME_ID,
        }
    }
}

/// Reported when the host cannot tell us a clock's resolution: one
/// millisecond, in nanoseconds.
pub const DEFAULT_CLOCK_RESOLUTION: u64 = 1_000_000;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// The WASI file types.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum FileType {
    Unknown = 0,
    BlockDevice = 1,
    CharacterDevice = 2,
    Directory = 3,
    RegularFile = 4,
    SocketDgram = 5,
    SocketStream = 6,
    SymbolicLink = 7,
}

impl FileType {
    /// Classifies the `st_mode` of a host `stat`.
    pub fn from_mode(mode: SFlag) -> Self {
        let kind = mode & SFlag::S_IFMT;
        if kind == SFlag::S_IFBLK {
            FileType::BlockDevice
        } else if kind == SFlag::S_IFCHR {
            FileType::CharacterDevice
        } else if kind == SFlag::S_IFDIR {
            FileType::Directory
        } else if kind == SFlag::S_IFREG {
            FileType::RegularFile
        } else if kind == SFlag::S_IFSOCK {
            FileType::SocketStream
        } else if kind == SFlag::S_IFLNK {
            FileType::SymbolicLink
        } else {
            FileType::Unknown
        }
    }
}

/// The WASI descriptor flags, a bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FdFlags(u16);

impl FdFlags {
    pub const APPEND: FdFlags = FdFlags(1 << 0);
    pub const DSYNC: FdFlags = FdFlags(1 << 1);
    pub const NONBLOCK: FdFlags = FdFlags(1 << 2);
    pub const RSYNC: FdFlags = FdFlags(1 << 3);
    pub const SYNC: FdFlags = FdFlags(1 << 4);

    #[inline]
    pub fn bits(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn contains(self, other: FdFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Translates the host's file status flags.
    pub fn from_host(flags: OFlag) -> Self {
        let mut bits = 0;
        if flags.contains(OFlag::O_APPEND) {
            bits |= Self::APPEND.0;
        }
        if flags.contains(OFlag::O_NONBLOCK) {
            bits |= Self::NONBLOCK.0;
        }
        // On Linux `O_SYNC` includes the `O_DSYNC` bit, and `O_RSYNC` is
        // `O_SYNC`.
        if flags.contains(OFlag::O_SYNC) {
            bits |= Self::SYNC.0;
        } else if flags.contains(OFlag::O_DSYNC) {
            bits |= Self::DSYNC.0;
        }
        FdFlags(bits)
    }
}

/// Rights are not enforced, so every descriptor reports all of them.
pub const ALL_RIGHTS: u64 = u64::MAX;

/// The WASI `fdstat` structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdStat {
    pub file_type: FileType,
    pub flags: FdFlags,
    pub rights_base: u64,
    pub rights_inheriting: u64,
}

impl FdStat {
    /// Size of the guest encoding.
    pub const SIZE: u32 = 24;

    /// The guest encoding: the file type at 0, flags at 2, base rights at 8
    /// and inheriting rights at 16, all little-endian.
    pub fn pack(&self) -> [u8; FdStat::SIZE as usize] {
        let mut bytes = [0u8; FdStat::SIZE as usize];
        bytes[0] = self.file_type as u8;
        LittleEndian::write_u16(&mut bytes[2..4], self.flags.bits());
        LittleEndian::write_u64(&mut bytes[8..16], self.rights_base);
        LittleEndian::write_u64(&mut bytes[16..24], self.rights_inheriting);
        bytes
    }
}

/// Size of the guest encoding of `prestat`: a `u32` tag and a `u32` name length.
pub const PRESTAT_SIZE: u32 = 8;

////////////////////////////////////////////////////////////////////////////////
// Fatal errors.
////////////////////////////////////////////////////////////////////////////////

/// A fatal, runtime error that terminates the guest program's execution
/// immediately, as opposed to the `ErrNo` a host call hands back to it.
#[derive(Debug, Error)]
pub enum FatalShimError {
    /// A host function was called with the wrong number or type of
    /// arguments.  The import type check at link time should make this
    /// impossible, so seeing it indicates a bug in the embedding runtime.
    #[error(
        display = "FatalShimError: Bad arguments passed to host function '{:?}'.",
        function_name
    )]
    BadArgumentsToHostFunction {
        /// The name of the host function that was being invoked.
        function_name: WasiAPIName,
    },
    /// The guest called an import that has no host function bound to it.
    #[error(display = "FatalShimError: Unknown Host call invoked: '{}'.", _0)]
    UnknownHostFunction(String),
    /// The options handed to the shim are not usable.
    #[error(display = "FatalShimError: Invalid configuration: {}.", _0)]
    InvalidConfiguration(String),
    /// Binding the host functions failed.
    #[error(display = "FatalShimError: {}", _0)]
    Link(LinkError),
    /// The guest called `proc_exit`.  Runtimes that can only stop a guest
    /// by failing the call use this to carry the exit code.
    #[error(display = "FatalShimError: Guest exited with code {}.", _0)]
    GuestExit(u32),
}

impl From<LinkError> for FatalShimError {
    fn from(error: LinkError) -> Self {
        FatalShimError::Link(error)
    }
}

////////////////////////////////////////////////////////////////////////////////
// The shim.
////////////////////////////////////////////////////////////////////////////////

/// The state of one guest program and the implementation of its WASI calls.
pub struct WasiShim {
    /// Options the program was started with.
    options: Options,
    /// Where `random_get` draws its bytes from.
    entropy: Box<dyn EntropySource + Send>,
    /// Set once the program has called `proc_exit`.
    exit_code: Option<u32>,
}

impl Default for WasiShim {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

/// Converts a guest descriptor into a host one.  Descriptors that do not fit
/// can never be open.
#[inline]
fn host_fd(fd: u32) -> ShimResult<RawFd> {
    RawFd::try_from(fd).map_err(|_| ErrNo::BadF)
}

/// Logs a failed host operation and translates its errno.
fn host_failure(operation: &str, fd: RawFd, errno: nix::errno::Errno) -> ErrNo {
    debug!("{} on host fd {} failed: {}", operation, fd, errno);
    errno_to_wasi(errno)
}

/// Reads into vectors that overlap through scratch buffers, copying the
/// result into place afterwards.  The scratch space is capped at the size of
/// memory and the read is shortened if the vectors ask for more.
fn read_overlapping<T: MemoryHandler + ?Sized>(memory: &mut T, fd: RawFd, iovecs: &[HostIoVec]) -> ShimResult<usize> {
    let mut budget = memory.memory_region()?.len();
    let mut scratch: Vec<Vec<u8>> = iovecs
        .iter()
        .map(|iovec| {
            let len = iovec.len.min(budget);
            budget -= len;
            vec![0u8; len]
        })
        .collect();
    let read = {
        let mut buffers: Vec<IoSliceMut> = scratch.iter_mut().map(|b| IoSliceMut::new(b)).collect();
        readv(fd, &mut buffers).map_err(|e| host_failure("readv", fd, e))?
    };

    let region = memory.memory_region()?;
    let mut left = read;
    for (iovec, buffer) in iovecs.iter().zip(scratch.iter()) {
        if left == 0 {
            break;
        }
        let len = left.min(buffer.len());
        region[iovec.start..iovec.start + len].copy_from_slice(&buffer[..len]);
        left -= len;
    }
    Ok(read)
}

#[inline]
fn timespec_to_nanos(time: TimeSpec) -> u64 {
    (time.tv_sec() as u64)
        .saturating_mul(NANOS_PER_SEC)
        .saturating_add(time.tv_nsec() as u64)
}

impl WasiShim {
    /// The name of the linear memory a guest module must export.
    pub const LINEAR_MEMORY_NAME: &'static str = "memory";
    /// The name of the entry point of a guest program.
    pub const ENTRY_POINT_NAME: &'static str = "_start";

    /// Creates the shim for a program started with `options`, drawing
    /// randomness from the operating system.
    pub fn new(options: Options) -> Self {
        Self::with_entropy_source(options, Box::new(OsEntropy))
    }

    /// Creates the shim with a specific entropy source.
    pub fn with_entropy_source(options: Options, entropy: Box<dyn EntropySource + Send>) -> Self {
        Self {
            options,
            entropy,
            exit_code: None,
        }
    }

    #[inline]
    pub fn options(&self) -> &Options {
        &self.options
    }

    #[inline]
    pub fn preopens(&self) -> &PreopenTable {
        &self.options.preopens
    }

    #[inline]
    pub fn strace_enabled(&self) -> bool {
        self.options.enable_strace
    }

    /// The code the program exited with, if it called `proc_exit`.
    #[inline]
    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    /// The program arguments, each NUL-terminated.
    fn encoded_arguments(&self) -> Vec<Vec<u8>> {
        self.options
            .program_arguments
            .iter()
            .map(|arg| {
                let mut bytes = Vec::with_capacity(arg.len() + 1);
                bytes.extend_from_slice(arg.as_bytes());
                bytes.push(0);
                bytes
            })
            .collect()
    }

    ////////////////////////////////////////////////////////////////////////////
    // Program arguments and environment.
    ////////////////////////////////////////////////////////////////////////////

    /// Writes the number of program arguments to `argc_address` and the total
    /// size of their NUL-terminated encodings to `size_address`.
    pub fn args_sizes_get<T: MemoryHandler + ?Sized>(
        &self,
        memory: &mut T,
        argc_address: u32,
        size_address: u32,
    ) -> ShimResult<()> {
        let arguments = self.encoded_arguments();
        let count = u32::try_from(arguments.len()).map_err(|_| ErrNo::TooBig)?;
        let size = arguments
            .iter()
            .try_fold(0u32, |acc, arg| acc.checked_add(arg.len() as u32))
            .ok_or(ErrNo::TooBig)?;
        memory.write_u32(argc_address, count)?;
        memory.write_u32(size_address, size)
    }

    /// Copies the program arguments into the buffer at `buf_address`, one
    /// after another, and the offset of each into the table at
    /// `argv_address`.
    pub fn args_get<T: MemoryHandler + ?Sized>(
        &self,
        memory: &mut T,
        argv_address: u32,
        buf_address: u32,
    ) -> ShimResult<()> {
        memory.write_string_list(&self.encoded_arguments(), buf_address, argv_address)
    }

    /// The guest sees an empty environment.
    pub fn environ_sizes_get<T: MemoryHandler + ?Sized>(
        &self,
        memory: &mut T,
        count_address: u32,
        size_address: u32,
    ) -> ShimResult<()> {
        memory.write_u32(count_address, 0)?;
        memory.write_u32(size_address, 0)
    }

    /// The guest sees an empty environment, so there is nothing to copy.
    pub fn environ_get<T: MemoryHandler + ?Sized>(
        &self,
        _memory: &mut T,
        _environ_address: u32,
        _buf_address: u32,
    ) -> ShimResult<()> {
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////////
    // Preopens and descriptor status.
    ////////////////////////////////////////////////////////////////////////////

    pub fn fd_prestat_get<T: MemoryHandler + ?Sized>(
        &self,
        memory: &mut T,
        fd: u32,
        address: u32,
    ) -> ShimResult<()> {
        let preopen = self.preopens().get(fd)?;
        let prestat = memory.slice_mut(address, PRESTAT_SIZE)?;
        LittleEndian::write_u32(&mut prestat[0..4], PREOPENTYPE_DIR);
        LittleEndian::write_u32(&mut prestat[4..8], preopen.name_len());
        Ok(())
    }

    /// Copies the name of preopen `fd` to `address`, truncated to `size`
    /// bytes.  No NUL terminator is written.
    pub fn fd_prestat_dir_name<T: MemoryHandler + ?Sized>(
        &self,
        memory: &mut T,
        fd: u32,
        address: u32,
        size: u32,
    ) -> ShimResult<()> {
        let name = self.preopens().get(fd)?.name().as_bytes();
        let len = name.len().min(size as usize);
        memory.write_buffer(address, &name[..len])
    }

    pub fn fd_fdstat_get<T: MemoryHandler + ?Sized>(
        &self,
        memory: &mut T,
        fd: u32,
        address: u32,
    ) -> ShimResult<()> {
        memory.slice(address, FdStat::SIZE)?;
        let fd = host_fd(fd)?;
        let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(|e| host_failure("fcntl", fd, e))?;
        let stat = fstat(fd).map_err(|e| host_failure("fstat", fd, e))?;
        let fdstat = FdStat {
            file_type: FileType::from_mode(SFlag::from_bits_truncate(stat.st_mode)),
            flags: FdFlags::from_host(OFlag::from_bits_truncate(flags)),
            rights_base: ALL_RIGHTS,
            rights_inheriting: ALL_RIGHTS,
        };
        memory.write_buffer(address, &fdstat.pack())
    }

    ////////////////////////////////////////////////////////////////////////////
    // Descriptor I/O.
    ////////////////////////////////////////////////////////////////////////////

    /// Moves the offset of `fd` and writes the resulting offset to `address`.
    pub fn fd_seek<T: MemoryHandler + ?Sized>(
        &self,
        memory: &mut T,
        fd: u32,
        offset: i64,
        whence: u32,
        address: u32,
    ) -> ShimResult<()> {
        memory.slice(address, 8)?;
        let whence = Whence::from_u32(whence).ok_or(ErrNo::Inval)?;
        let fd = host_fd(fd)?;
        let position = unistd::lseek(fd, offset as nix::libc::off_t, whence.to_host())
            .map_err(|e| host_failure("lseek", fd, e))?;
        memory.write_u64(address, position as u64)
    }

    /// Scatter-reads from `fd` into the guest buffers described by the
    /// `count` I/O vectors at `iovs`, and writes the number of bytes read to
    /// `address`.  A short read is not an error.
    pub fn fd_read<T: MemoryHandler + ?Sized>(
        &self,
        memory: &mut T,
        fd: u32,
        iovs: u32,
        count: u32,
        address: u32,
    ) -> ShimResult<()> {
        memory.slice(address, 4)?;
        let fd = host_fd(fd)?;
        let iovecs = memory.copy_iovecs_to_host(iovs, count)?;

        let direct = {
            let region = memory.memory_region()?;
            match split_iovecs_mut(region, &iovecs) {
                Some(slices) => {
                    let mut buffers: Vec<IoSliceMut> = slices.into_iter().map(IoSliceMut::new).collect();
                    Some(readv(fd, &mut buffers).map_err(|e| host_failure("readv", fd, e))?)
                }
                None => None,
            }
        };
        let read = match direct {
            Some(read) => read,
            None => read_overlapping(memory, fd, &iovecs)?,
        };
        memory.write_u32(address, read as u32)
    }

    /// Gather-writes the guest buffers described by the `count` I/O vectors
    /// at `iovs` to `fd`, and writes the number of bytes written to
    /// `address`.
    pub fn fd_write<T: MemoryHandler + ?Sized>(
        &self,
        memory: &mut T,
        fd: u32,
        iovs: u32,
        count: u32,
        address: u32,
    ) -> ShimResult<()> {
        memory.slice(address, 4)?;
        let fd = host_fd(fd)?;
        let iovecs = memory.copy_iovecs_to_host(iovs, count)?;
        let written = {
            let region = memory.memory_region()?;
            let buffers: Vec<IoSlice> = iovecs
                .iter()
                .map(|iovec| IoSlice::new(&region[iovec.range()]))
                .collect();
            writev(fd, &buffers).map_err(|e| host_failure("writev", fd, e))?
        };
        memory.write_u32(address, written as u32)
    }

    pub fn fd_close(&self, fd: u32) -> ShimResult<()> {
        let fd = host_fd(fd)?;
        unistd::close(fd).map_err(|e| host_failure("close", fd, e))
    }

    pub fn fd_datasync(&self, fd: u32) -> ShimResult<()> {
        let fd = host_fd(fd)?;
        cfg_if! {
            if #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))] {
                unistd::fdatasync(fd).map_err(|e| host_failure("fdatasync", fd, e))
            } else {
                unistd::fsync(fd).map_err(|e| host_failure("fsync", fd, e))
            }
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // Randomness and clocks.
    ////////////////////////////////////////////////////////////////////////////

    /// Fills the `length` bytes at `address` with random bytes.
    pub fn random_get<T: MemoryHandler + ?Sized>(
        &mut self,
        memory: &mut T,
        address: u32,
        length: u32,
    ) -> ShimResult<()> {
        let buffer = memory.slice_mut(address, length)?;
        fill_random(self.entropy.as_mut(), buffer)
    }

    /// Writes the resolution of `clock_id`, in nanoseconds, to `address`.
    /// Clocks the host cannot report on get `DEFAULT_CLOCK_RESOLUTION`.
    pub fn clock_res_get<T: MemoryHandler + ?Sized>(
        &self,
        memory: &mut T,
        clock_id: u32,
        address: u32,
    ) -> ShimResult<()> {
        if !self.options.enable_clock {
            return Err(ErrNo::NoSys);
        }
        let resolution = match ClockId::from_u32(clock_id).map(|id| (id, clock_getres(id.to_host()))) {
            Some((_, Ok(resolution))) => timespec_to_nanos(resolution),
            Some((id, Err(e))) => {
                debug!("clock_getres({:?}) failed: {}", id, e);
                DEFAULT_CLOCK_RESOLUTION
            }
            None => {
                debug!("no host clock for clock id {}", clock_id);
                DEFAULT_CLOCK_RESOLUTION
            }
        };
        memory.write_u64(address, resolution)
    }

    /// Writes the current time of `clock_id`, in nanoseconds, to `address`.
    /// The precision hint is ignored.
    pub fn clock_time_get<T: MemoryHandler + ?Sized>(
        &self,
        memory: &mut T,
        clock_id: u32,
        _precision: u64,
        address: u32,
    ) -> ShimResult<()> {
        if !self.options.enable_clock {
            return Err(ErrNo::NoSys);
        }
        let clock_id = ClockId::from_u32(clock_id).ok_or(ErrNo::Inval)?;
        let time = clock_gettime(clock_id.to_host()).map_err(|e| {
            debug!("clock_gettime({:?}) failed: {}", clock_id, e);
            errno_to_wasi(e)
        })?;
        memory.write_u64(address, timespec_to_nanos(time))
    }

    ////////////////////////////////////////////////////////////////////////////
    // Process control.
    ////////////////////////////////////////////////////////////////////////////

    /// Ends the program with `exit_code`.  The runtime must not resume the
    /// guest after this returns.
    pub fn proc_exit(&mut self, exit_code: u32) -> HostCallOutcome {
        info!("guest program exited with code {}", exit_code);
        self.exit_code = Some(exit_code);
        if self.options.terminate_process_on_exit {
            std::process::exit(exit_code as i32);
        }
        HostCallOutcome::Exit(exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        fs::{File, OpenOptions},
        io::{Read, Seek, SeekFrom, Write},
        os::unix::{fs::OpenOptionsExt, io::AsRawFd},
    };
    use strum::IntoEnumIterator;

    #[test]
    fn api_names_round_trip() {
        for name in WasiAPIName::iter() {
            let text: &'static str = name.into();
            assert_eq!(text.parse::<WasiAPIName>(), Ok(name));
        }
        assert_eq!(WasiAPIName::FD_WRITE.to_string(), "fd_write");
        assert!("path_open".parse::<WasiAPIName>().is_err());
    }

    #[test]
    fn fdstat_encoding_is_fixed() {
        let fdstat = FdStat {
            file_type: FileType::RegularFile,
            flags: FdFlags::APPEND,
            rights_base: 0x0102,
            rights_inheriting: ALL_RIGHTS,
        };
        let bytes = fdstat.pack();
        assert_eq!(bytes[0], 4);
        assert_eq!(&bytes[2..4], &[1, 0]);
        assert_eq!(&bytes[8..10], &[2, 1]);
        assert_eq!(&bytes[16..24], &[0xff; 8]);
    }

    #[test]
    fn fdstat_of_a_regular_file() {
        let file = tempfile::tempfile().unwrap();
        let shim = WasiShim::default();
        let mut memory = vec![0u8; 64];
        shim.fd_fdstat_get(&mut memory, file.as_raw_fd() as u32, 8).unwrap();
        assert_eq!(memory[8], FileType::RegularFile as u8);
        assert_eq!(memory.read_u64(16).unwrap(), ALL_RIGHTS);
        assert_eq!(
            shim.fd_fdstat_get(&mut memory, file.as_raw_fd() as u32, 60),
            Err(ErrNo::Fault)
        );
    }

    #[test]
    fn fdstat_of_a_directory_and_append_flag() {
        let dir = tempfile::tempdir().unwrap();
        let shim = WasiShim::default();
        let mut memory = vec![0u8; 32];

        let handle = File::open(dir.path()).unwrap();
        shim.fd_fdstat_get(&mut memory, handle.as_raw_fd() as u32, 0).unwrap();
        assert_eq!(memory[0], FileType::Directory as u8);

        let log = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(dir.path().join("log"))
            .unwrap();
        shim.fd_fdstat_get(&mut memory, log.as_raw_fd() as u32, 0).unwrap();
        assert_eq!(memory.read_u32(0).unwrap() >> 16 & 0xffff, FdFlags::APPEND.bits() as u32);
    }

    #[test]
    fn synchronous_writes_are_not_reported_as_dsync() {
        let dir = tempfile::tempdir().unwrap();
        let shim = WasiShim::default();
        let mut memory = vec![0u8; 32];

        let sync = OpenOptions::new()
            .write(true)
            .create(true)
            .custom_flags(nix::libc::O_SYNC)
            .open(dir.path().join("sync"))
            .unwrap();
        shim.fd_fdstat_get(&mut memory, sync.as_raw_fd() as u32, 0).unwrap();
        assert_eq!(LittleEndian::read_u16(&memory[2..4]), FdFlags::SYNC.bits());

        let dsync = OpenOptions::new()
            .write(true)
            .create(true)
            .custom_flags(nix::libc::O_DSYNC)
            .open(dir.path().join("dsync"))
            .unwrap();
        shim.fd_fdstat_get(&mut memory, dsync.as_raw_fd() as u32, 0).unwrap();
        assert_eq!(LittleEndian::read_u16(&memory[2..4]), FdFlags::DSYNC.bits());
    }

    #[test]
    fn host_sync_flags_translate() {
        assert_eq!(FdFlags::from_host(OFlag::O_SYNC), FdFlags::SYNC);
        assert_eq!(FdFlags::from_host(OFlag::O_DSYNC), FdFlags::DSYNC);
        assert_eq!(FdFlags::from_host(OFlag::O_APPEND).bits(), FdFlags::APPEND.bits());
    }

    #[test]
    fn reads_land_in_disjoint_vectors_in_order() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"abcdefgh").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let shim = WasiShim::default();
        let mut memory = vec![0u8; 64];
        // The first vector lies above the second.
        memory.write_u32(0, 48).unwrap();
        memory.write_u32(4, 3).unwrap();
        memory.write_u32(8, 32).unwrap();
        memory.write_u32(12, 8).unwrap();

        shim.fd_read(&mut memory, file.as_raw_fd() as u32, 0, 2, 16).unwrap();
        assert_eq!(memory.read_u32(16).unwrap(), 8);
        assert_eq!(&memory[48..51], b"abc");
        assert_eq!(&memory[32..38], b"defgh\0");
    }

    #[test]
    fn reads_into_overlapping_vectors_keep_the_later_bytes() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"abcdef").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let shim = WasiShim::default();
        let mut memory = vec![0u8; 64];
        memory.write_u32(0, 32).unwrap();
        memory.write_u32(4, 4).unwrap();
        memory.write_u32(8, 34).unwrap();
        memory.write_u32(12, 4).unwrap();

        shim.fd_read(&mut memory, file.as_raw_fd() as u32, 0, 2, 16).unwrap();
        assert_eq!(memory.read_u32(16).unwrap(), 6);
        assert_eq!(&memory[32..36], b"abef");

        let mut rest = Vec::new();
        file.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    }

    #[test]
    fn seek_follows_the_host() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"0123456789").unwrap();
        let fd = file.as_raw_fd() as u32;
        let shim = WasiShim::default();
        let mut memory = vec![0u8; 16];

        shim.fd_seek(&mut memory, fd, 2, Whence::Set as u32, 0).unwrap();
        assert_eq!(memory.read_u64(0).unwrap(), 2);
        shim.fd_seek(&mut memory, fd, 3, Whence::Cur as u32, 0).unwrap();
        assert_eq!(memory.read_u64(0).unwrap(), 5);
        shim.fd_seek(&mut memory, fd, -1, Whence::End as u32, 0).unwrap();
        assert_eq!(memory.read_u64(0).unwrap(), 9);
        assert_eq!(shim.fd_seek(&mut memory, fd, 0, 3, 0), Err(ErrNo::Inval));
        assert_eq!(shim.fd_seek(&mut memory, fd, -100, Whence::Set as u32, 0), Err(ErrNo::Inval));
    }

    #[test]
    fn prestat_of_a_directory() {
        let options = Options {
            preopens: PreopenTable::default().with_directory("/sandbox"),
            ..Options::default()
        };
        let shim = WasiShim::new(options);
        let mut memory = vec![0xaau8; 32];

        shim.fd_prestat_get(&mut memory, 3, 0).unwrap();
        assert_eq!(memory.read_u32(0).unwrap(), PREOPENTYPE_DIR);
        assert_eq!(memory.read_u32(4).unwrap(), 8);
        assert_eq!(shim.fd_prestat_get(&mut memory, 1, 0), Err(ErrNo::BadF));
        assert_eq!(shim.fd_prestat_get(&mut memory, 4, 0), Err(ErrNo::BadF));

        shim.fd_prestat_dir_name(&mut memory, 3, 16, 4).unwrap();
        assert_eq!(&memory[16..21], b"/san\xaa");
    }

    #[test]
    fn clocks_can_be_disabled() {
        let shim = WasiShim::new(Options {
            enable_clock: false,
            ..Options::default()
        });
        let mut memory = vec![0u8; 8];
        assert_eq!(shim.clock_res_get(&mut memory, 0, 0), Err(ErrNo::NoSys));
        assert_eq!(shim.clock_time_get(&mut memory, 1, 0, 0), Err(ErrNo::NoSys));
    }

    #[test]
    fn clocks_report_nanoseconds() {
        let shim = WasiShim::default();
        let mut memory = vec![0u8; 8];
        for id in 0..4 {
            shim.clock_res_get(&mut memory, id, 0).unwrap();
            assert!(memory.read_u64(0).unwrap() > 0);
        }
        shim.clock_time_get(&mut memory, ClockId::RealTime as u32, 0, 0).unwrap();
        // Some time after 2001.
        assert!(memory.read_u64(0).unwrap() > 1_000_000_000 * NANOS_PER_SEC);
        assert_eq!(shim.clock_time_get(&mut memory, 4, 0, 0), Err(ErrNo::Inval));
    }

    #[test]
    fn unknown_clocks_report_one_millisecond() {
        let shim = WasiShim::default();
        let mut memory = vec![0u8; 8];
        shim.clock_res_get(&mut memory, 9, 0).unwrap();
        assert_eq!(memory.read_u64(0).unwrap(), DEFAULT_CLOCK_RESOLUTION);
        assert_eq!(memory.read_u64(0).unwrap(), 1_000_000);
        assert_eq!(shim.clock_res_get(&mut memory, 9, 4), Err(ErrNo::Fault));
    }

    #[test]
    fn bad_descriptors_are_reported() {
        let shim = WasiShim::default();
        let mut memory = vec![0u8; 32];
        assert_eq!(shim.fd_close(u32::MAX), Err(ErrNo::BadF));
        assert_eq!(shim.fd_datasync(9999), Err(ErrNo::BadF));
        assert_eq!(shim.fd_fdstat_get(&mut memory, 9999, 0), Err(ErrNo::BadF));
    }

    #[test]
    fn proc_exit_records_the_code() {
        let mut shim = WasiShim::default();
        assert_eq!(shim.exit_code(), None);
        assert_eq!(shim.proc_exit(3), HostCallOutcome::Exit(3));
        assert_eq!(shim.exit_code(), Some(3));
    }
}
