use std::fmt;

/// Error taxonomy for the kernel and filesystem cores.
///
/// Every fallible kernel or filesystem primitive returns one of these kinds
/// instead of an out-of-band global error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    WriteContended,
    IllegalMode,
    ReadFromOutput,
    WriteToInput,
    CloseTerminal,
    SeekOnTerminal,
    ReadOnly,
    SeekOutOfBounds,
    FdTableFull,
    NoSpace,
    NoChild,
    SpawnFailed,
    InvalidInput,
    CorruptedFileSystem,
    IoFatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "no such file",
            ErrorKind::AlreadyExists => "file already exists",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::WriteContended => "another process holds write access",
            ErrorKind::IllegalMode => "illegal open mode",
            ErrorKind::ReadFromOutput => "cannot read from stdout/stderr",
            ErrorKind::WriteToInput => "cannot write to stdin",
            ErrorKind::CloseTerminal => "cannot close a terminal descriptor",
            ErrorKind::SeekOnTerminal => "cannot seek a terminal descriptor",
            ErrorKind::ReadOnly => "caller does not hold write access",
            ErrorKind::SeekOutOfBounds => "seek offset out of bounds",
            ErrorKind::FdTableFull => "file descriptor table is full",
            ErrorKind::NoSpace => "no free block on device",
            ErrorKind::NoChild => "no eligible child",
            ErrorKind::SpawnFailed => "failed to spawn process",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::CorruptedFileSystem => "corrupted filesystem image",
            ErrorKind::IoFatal => "fatal host I/O error",
        }
    }
}

/// An error produced by a kernel or filesystem primitive.
///
/// The source this core is derived from reports failure through a process
/// global (`ERRNO`) inspected after the fact. Here every fallible call
/// returns this type directly instead.
#[derive(Debug)]
#[non_exhaustive]
pub struct Error {
    kind: ErrorKind,
    detail: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error { kind, detail: None }
    }

    pub fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Error {
            kind,
            detail: Some(detail.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", self.kind.as_str(), detail),
            None => write!(f, "{}", self.kind.as_str()),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::with_detail(ErrorKind::IoFatal, e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
