//! Guest error codes.
//!
//! The WASI errno enumeration, as seen by the guest, and the translation from
//! host `errno` values into it.  Every host call returns exactly one of these
//! codes to the guest.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use log::warn;
use nix::errno::Errno;
use std::fmt;

/// Results of guest-facing operations.  The return code `ErrNo::Success` is
/// implicit if `Ok(result)` is returned.  The result `Err(ErrNo::Success)`
/// should never be returned.
pub type ShimResult<T> = Result<T, ErrNo>;

/// The WASI error codes, in the order and with the values fixed by the
/// `wasi_snapshot_preview1` ABI.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
pub enum ErrNo {
    Success = 0,
    TooBig,
    Access,
    AddrInUse,
    AddrNotAvail,
    AfNoSupport,
    Again,
    Already,
    BadF,
    BadMsg,
    Busy,
    Canceled,
    Child,
    ConnAborted,
    ConnRefused,
    ConnReset,
    DeadLk,
    DestAddrReq,
    Dom,
    DQuot,
    Exist,
    Fault,
    FBig,
    HostUnreach,
    IdRm,
    IlSeq,
    InProgress,
    Intr,
    Inval,
    Io,
    IsConn,
    IsDir,
    Loop,
    MFile,
    MLink,
    MsgSize,
    MultiHop,
    NameTooLong,
    NetDown,
    NetReset,
    NetUnreach,
    NFile,
    NoBufs,
    NoDev,
    NoEnt,
    NoExec,
    NoLck,
    NoLink,
    NoMem,
    NoMsg,
    NoProtoOpt,
    NoSpc,
    NoSys,
    NotConn,
    NotDir,
    NotEmpty,
    NotRecoverable,
    NotSock,
    NotSup,
    NotTty,
    NxIo,
    Overflow,
    OwnerDead,
    Perm,
    Pipe,
    Proto,
    ProtoNoSupport,
    ProtoType,
    Range,
    RoFs,
    SPipe,
    Srch,
    Stale,
    TimedOut,
    TxtBsy,
    XDev,
    NotCapable,
}

impl ErrNo {
    /// The numeric code handed back to the guest.
    #[inline]
    pub fn code(self) -> u32 {
        self as u16 as u32
    }
}

impl fmt::Display for ErrNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for ErrNo {}

/// Collapses a guest-facing result into the code returned to the guest.
#[inline]
pub fn convert_to_errno<T>(input: ShimResult<T>) -> u32 {
    match input {
        Ok(_) => ErrNo::Success.code(),
        Err(e) => e.code(),
    }
}

/// Translates a host `errno` into the guest error code.
///
/// Host codes without a WASI counterpart are reported as `ErrNo::Io` rather
/// than leaking the platform's raw number, which could alias an unrelated
/// WASI code.
pub fn errno_to_wasi(errno: Errno) -> ErrNo {
    match errno {
        Errno::E2BIG => ErrNo::TooBig,
        Errno::EACCES => ErrNo::Access,
        Errno::EADDRINUSE => ErrNo::AddrInUse,
        Errno::EADDRNOTAVAIL => ErrNo::AddrNotAvail,
        Errno::EAFNOSUPPORT => ErrNo::AfNoSupport,
        Errno::EAGAIN => ErrNo::Again,
        Errno::EALREADY => ErrNo::Already,
        Errno::EBADF => ErrNo::BadF,
        Errno::EBADMSG => ErrNo::BadMsg,
        Errno::EBUSY => ErrNo::Busy,
        Errno::ECANCELED => ErrNo::Canceled,
        Errno::ECHILD => ErrNo::Child,
        Errno::ECONNABORTED => ErrNo::ConnAborted,
        Errno::ECONNREFUSED => ErrNo::ConnRefused,
        Errno::ECONNRESET => ErrNo::ConnReset,
        Errno::EDEADLK => ErrNo::DeadLk,
        Errno::EDESTADDRREQ => ErrNo::DestAddrReq,
        Errno::EDOM => ErrNo::Dom,
        Errno::EDQUOT => ErrNo::DQuot,
        Errno::EEXIST => ErrNo::Exist,
        Errno::EFAULT => ErrNo::Fault,
        Errno::EFBIG => ErrNo::FBig,
        Errno::EHOSTUNREACH => ErrNo::HostUnreach,
        Errno::EIDRM => ErrNo::IdRm,
        Errno::EILSEQ => ErrNo::IlSeq,
        Errno::EINPROGRESS => ErrNo::InProgress,
        Errno::EINTR => ErrNo::Intr,
        Errno::EINVAL => ErrNo::Inval,
        Errno::EIO => ErrNo::Io,
        Errno::EISCONN => ErrNo::IsConn,
        Errno::EISDIR => ErrNo::IsDir,
        Errno::ELOOP => ErrNo::Loop,
        Errno::EMFILE => ErrNo::MFile,
        Errno::EMLINK => ErrNo::MLink,
        Errno::EMSGSIZE => ErrNo::MsgSize,
        Errno::EMULTIHOP => ErrNo::MultiHop,
        Errno::ENAMETOOLONG => ErrNo::NameTooLong,
        Errno::ENETDOWN => ErrNo::NetDown,
        Errno::ENETRESET => ErrNo::NetReset,
        Errno::ENETUNREACH => ErrNo::NetUnreach,
        Errno::ENFILE => ErrNo::NFile,
        Errno::ENOBUFS => ErrNo::NoBufs,
        Errno::ENODEV => ErrNo::NoDev,
        Errno::ENOENT => ErrNo::NoEnt,
        Errno::ENOEXEC => ErrNo::NoExec,
        Errno::ENOLCK => ErrNo::NoLck,
        Errno::ENOLINK => ErrNo::NoLink,
        Errno::ENOMEM => ErrNo::NoMem,
        Errno::ENOMSG => ErrNo::NoMsg,
        Errno::ENOPROTOOPT => ErrNo::NoProtoOpt,
        Errno::ENOSPC => ErrNo::NoSpc,
        Errno::ENOSYS => ErrNo::NoSys,
        Errno::ENOTCONN => ErrNo::NotConn,
        Errno::ENOTDIR => ErrNo::NotDir,
        Errno::ENOTEMPTY => ErrNo::NotEmpty,
        Errno::ENOTRECOVERABLE => ErrNo::NotRecoverable,
        Errno::ENOTSOCK => ErrNo::NotSock,
        Errno::EOPNOTSUPP => ErrNo::NotSup,
        Errno::ENOTTY => ErrNo::NotTty,
        Errno::ENXIO => ErrNo::NxIo,
        Errno::EOVERFLOW => ErrNo::Overflow,
        Errno::EOWNERDEAD => ErrNo::OwnerDead,
        Errno::EPERM => ErrNo::Perm,
        Errno::EPIPE => ErrNo::Pipe,
        Errno::EPROTO => ErrNo::Proto,
        Errno::EPROTONOSUPPORT => ErrNo::ProtoNoSupport,
        Errno::EPROTOTYPE => ErrNo::ProtoType,
        Errno::ERANGE => ErrNo::Range,
        Errno::EROFS => ErrNo::RoFs,
        Errno::ESPIPE => ErrNo::SPipe,
        Errno::ESRCH => ErrNo::Srch,
        Errno::ESTALE => ErrNo::Stale,
        Errno::ETIMEDOUT => ErrNo::TimedOut,
        Errno::ETXTBSY => ErrNo::TxtBsy,
        Errno::EXDEV => ErrNo::XDev,
        otherwise => {
            warn!(
                "host errno {} ({}) has no WASI counterpart, reporting Io",
                otherwise as i32,
                otherwise.desc()
            );
            ErrNo::Io
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn codes_follow_the_preview1_numbering() {
        assert_eq!(ErrNo::Success.code(), 0);
        assert_eq!(ErrNo::BadF.code(), 8);
        assert_eq!(ErrNo::Fault.code(), 21);
        assert_eq!(ErrNo::Inval.code(), 28);
        assert_eq!(ErrNo::Io.code(), 29);
        assert_eq!(ErrNo::NoSys.code(), 52);
        assert_eq!(ErrNo::SPipe.code(), 70);
        assert_eq!(ErrNo::NotCapable.code(), 76);
        assert_eq!(ErrNo::from_u16(44), Some(ErrNo::NoEnt));
        assert_eq!(ErrNo::from_u16(77), None);
    }

    #[test]
    fn host_errnos_translate_to_their_wasi_names() {
        assert_eq!(errno_to_wasi(Errno::EPERM), ErrNo::Perm);
        assert_eq!(errno_to_wasi(Errno::ENOENT), ErrNo::NoEnt);
        assert_eq!(errno_to_wasi(Errno::EBADF), ErrNo::BadF);
        assert_eq!(errno_to_wasi(Errno::ESPIPE), ErrNo::SPipe);
        assert_eq!(errno_to_wasi(Errno::EINTR), ErrNo::Intr);
        assert_eq!(errno_to_wasi(Errno::ENAMETOOLONG), ErrNo::NameTooLong);
    }

    #[test]
    fn unmapped_host_errno_does_not_leak() {
        assert_eq!(errno_to_wasi(Errno::UnknownErrno), ErrNo::Io);
    }

    #[test]
    fn convert_collapses_results() {
        assert_eq!(convert_to_errno::<()>(Ok(())), 0);
        assert_eq!(convert_to_errno::<u64>(Err(ErrNo::BadF)), 8);
    }
}
