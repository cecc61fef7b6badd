//! The fixed WATER errno table.
//!
//! WATM guests report failures as the negation of an errno drawn from this
//! table. The numbering (1..76) is part of the wire ABI and is deliberately
//! independent of the host OS's native errno values, so translation tables in
//! both directions live here and nowhere else.

use std::fmt;
use std::io;

/// Decode failures at the ABI boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbiError {
    /// A negative guest return did not map to any table entry.
    #[error("unknown WATER errno {0}")]
    UnknownErrno(i32),
}

macro_rules! water_errnos {
    ($($variant:ident = $raw:literal => $name:literal,)+) => {
        /// A WATER errno (1..76).
        ///
        /// Zero is success and is not representable here; success and
        /// descriptors are the non-negative half of the return namespace.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum Errno {
            $($variant = $raw,)+
        }

        impl Errno {
            /// Every table entry, in numbering order.
            pub const ALL: &'static [Errno] = &[$(Errno::$variant,)+];

            /// Decode a raw (positive) errno value.
            pub fn from_raw(raw: i32) -> Result<Self, AbiError> {
                match raw {
                    $($raw => Ok(Errno::$variant),)+
                    other => Err(AbiError::UnknownErrno(other)),
                }
            }

            /// The POSIX-style name, e.g. `"ECANCELED"`.
            pub fn name(self) -> &'static str {
                match self {
                    $(Errno::$variant => $name,)+
                }
            }
        }
    };
}

water_errnos! {
    TooBig = 1 => "E2BIG",
    Acces = 2 => "EACCES",
    AddrInUse = 3 => "EADDRINUSE",
    AddrNotAvail = 4 => "EADDRNOTAVAIL",
    AfNoSupport = 5 => "EAFNOSUPPORT",
    Again = 6 => "EAGAIN",
    Already = 7 => "EALREADY",
    Badf = 8 => "EBADF",
    BadMsg = 9 => "EBADMSG",
    Busy = 10 => "EBUSY",
    Canceled = 11 => "ECANCELED",
    Child = 12 => "ECHILD",
    ConnAborted = 13 => "ECONNABORTED",
    ConnRefused = 14 => "ECONNREFUSED",
    ConnReset = 15 => "ECONNRESET",
    Deadlk = 16 => "EDEADLK",
    DestAddrReq = 17 => "EDESTADDRREQ",
    Dom = 18 => "EDOM",
    Dquot = 19 => "EDQUOT",
    Exist = 20 => "EEXIST",
    Fault = 21 => "EFAULT",
    Fbig = 22 => "EFBIG",
    HostUnreach = 23 => "EHOSTUNREACH",
    Idrm = 24 => "EIDRM",
    Ilseq = 25 => "EILSEQ",
    InProgress = 26 => "EINPROGRESS",
    Intr = 27 => "EINTR",
    Inval = 28 => "EINVAL",
    Io = 29 => "EIO",
    IsConn = 30 => "EISCONN",
    IsDir = 31 => "EISDIR",
    Loop = 32 => "ELOOP",
    Mfile = 33 => "EMFILE",
    Mlink = 34 => "EMLINK",
    MsgSize = 35 => "EMSGSIZE",
    Multihop = 36 => "EMULTIHOP",
    NameTooLong = 37 => "ENAMETOOLONG",
    NetDown = 38 => "ENETDOWN",
    NetReset = 39 => "ENETRESET",
    NetUnreach = 40 => "ENETUNREACH",
    Nfile = 41 => "ENFILE",
    NoBufs = 42 => "ENOBUFS",
    NoDev = 43 => "ENODEV",
    NoEnt = 44 => "ENOENT",
    NoExec = 45 => "ENOEXEC",
    NoLck = 46 => "ENOLCK",
    NoLink = 47 => "ENOLINK",
    NoMem = 48 => "ENOMEM",
    NoMsg = 49 => "ENOMSG",
    NoProtoOpt = 50 => "ENOPROTOOPT",
    NoSpc = 51 => "ENOSPC",
    NoSys = 52 => "ENOSYS",
    NotConn = 53 => "ENOTCONN",
    NotDir = 54 => "ENOTDIR",
    NotEmpty = 55 => "ENOTEMPTY",
    NotRecoverable = 56 => "ENOTRECOVERABLE",
    NotSock = 57 => "ENOTSOCK",
    NotSup = 58 => "ENOTSUP",
    NoTty = 59 => "ENOTTY",
    Nxio = 60 => "ENXIO",
    Overflow = 61 => "EOVERFLOW",
    OwnerDead = 62 => "EOWNERDEAD",
    Perm = 63 => "EPERM",
    Pipe = 64 => "EPIPE",
    Proto = 65 => "EPROTO",
    ProtoNoSupport = 66 => "EPROTONOSUPPORT",
    Prototype = 67 => "EPROTOTYPE",
    Range = 68 => "ERANGE",
    Rofs = 69 => "EROFS",
    Spipe = 70 => "ESPIPE",
    Srch = 71 => "ESRCH",
    Stale = 72 => "ESTALE",
    TimedOut = 73 => "ETIMEDOUT",
    TxtBsy = 74 => "ETXTBSY",
    Xdev = 75 => "EXDEV",
    NotCapable = 76 => "ENOTCAPABLE",
}

impl Errno {
    /// The raw (positive) table value.
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Encode for a guest return: the two's-complement negation.
    pub fn negated(self) -> i32 {
        -(self as i32)
    }

    /// Decode a negative guest return value.
    ///
    /// `ret` must be negative; the errno is recovered by negating it.
    pub fn from_negated(ret: i32) -> Result<Self, AbiError> {
        Self::from_raw(ret.checked_neg().unwrap_or(i32::MIN))
    }

    /// Best-effort translation of a host I/O error into the table.
    ///
    /// Unmapped kinds collapse to `EIO`.
    pub fn from_io_error(err: &io::Error) -> Errno {
        use io::ErrorKind::*;
        match err.kind() {
            NotFound => Errno::NoEnt,
            PermissionDenied => Errno::Acces,
            ConnectionRefused => Errno::ConnRefused,
            ConnectionReset => Errno::ConnReset,
            HostUnreachable => Errno::HostUnreach,
            NetworkUnreachable => Errno::NetUnreach,
            ConnectionAborted => Errno::ConnAborted,
            NotConnected => Errno::NotConn,
            AddrInUse => Errno::AddrInUse,
            AddrNotAvailable => Errno::AddrNotAvail,
            NetworkDown => Errno::NetDown,
            BrokenPipe => Errno::Pipe,
            AlreadyExists => Errno::Exist,
            WouldBlock => Errno::Again,
            NotADirectory => Errno::NotDir,
            IsADirectory => Errno::IsDir,
            DirectoryNotEmpty => Errno::NotEmpty,
            ReadOnlyFilesystem => Errno::Rofs,
            StorageFull => Errno::NoSpc,
            NotSeekable => Errno::Spipe,
            FileTooLarge => Errno::Fbig,
            ResourceBusy => Errno::Busy,
            ExecutableFileBusy => Errno::TxtBsy,
            Deadlock => Errno::Deadlk,
            CrossesDevices => Errno::Xdev,
            TooManyLinks => Errno::Mlink,
            InvalidFilename => Errno::NameTooLong,
            ArgumentListTooLong => Errno::TooBig,
            Interrupted => Errno::Intr,
            Unsupported => Errno::NotSup,
            OutOfMemory => Errno::NoMem,
            InvalidInput | InvalidData => Errno::Inval,
            TimedOut => Errno::TimedOut,
            _ => Errno::Io,
        }
    }

    /// The closest `std::io::ErrorKind` for this errno.
    pub fn to_io_kind(self) -> io::ErrorKind {
        use io::ErrorKind::*;
        match self {
            Errno::NoEnt => NotFound,
            Errno::Acces | Errno::Perm | Errno::NotCapable => PermissionDenied,
            Errno::ConnRefused => ConnectionRefused,
            Errno::ConnReset | Errno::NetReset => ConnectionReset,
            Errno::HostUnreach => HostUnreachable,
            Errno::NetUnreach => NetworkUnreachable,
            Errno::ConnAborted => ConnectionAborted,
            Errno::NotConn => NotConnected,
            Errno::AddrInUse => AddrInUse,
            Errno::AddrNotAvail => AddrNotAvailable,
            Errno::NetDown => NetworkDown,
            Errno::Pipe => BrokenPipe,
            Errno::Exist => AlreadyExists,
            Errno::Again => WouldBlock,
            Errno::NotDir => NotADirectory,
            Errno::IsDir => IsADirectory,
            Errno::NotEmpty => DirectoryNotEmpty,
            Errno::Rofs => ReadOnlyFilesystem,
            Errno::NoSpc => StorageFull,
            Errno::Spipe => NotSeekable,
            Errno::Fbig => FileTooLarge,
            Errno::Busy => ResourceBusy,
            Errno::TxtBsy => ExecutableFileBusy,
            Errno::Deadlk => Deadlock,
            Errno::Xdev => CrossesDevices,
            Errno::Mlink => TooManyLinks,
            Errno::NameTooLong => InvalidFilename,
            Errno::TooBig => ArgumentListTooLong,
            Errno::Intr => Interrupted,
            Errno::NotSup => Unsupported,
            Errno::NoMem => OutOfMemory,
            Errno::Inval => InvalidInput,
            Errno::TimedOut => TimedOut,
            _ => Other,
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::error::Error for Errno {}

impl From<Errno> for io::Error {
    fn from(e: Errno) -> Self {
        io::Error::new(e.to_io_kind(), e)
    }
}
