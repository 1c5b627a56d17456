use std::{error, fmt, io};

/// Errors produced by the instrumentation transform and the lazy heap runtime.
#[derive(Debug)]
pub enum Error {
    /// The classifier or lowering pass hit an IR shape it cannot rewrite
    /// (scalable vectors, a masked intrinsic with an unexpected operand
    /// arrangement). Fatal: no partial output is produced for the module.
    UnsupportedShape { function: String, detail: String },
    /// The requested entry point (by name or by index) does not exist.
    NoSuchEntryPoint(String),
    /// The requested entry point is a declaration, not a definition.
    EntryPointIsDeclaration(String),
    /// An instrumented artifact was replayed against a runtime built for a
    /// different callback ABI version.
    VersionMismatch { expected: u32, found: u32 },
    /// Input file is structurally invalid (truncated, bad relocation kind).
    InvalidInputFile(&'static str),
    /// I/O failure while reading or writing an input file.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedShape { function, detail } => {
                write!(f, "unsupported IR shape in `{function}`: {detail}")
            }
            Self::NoSuchEntryPoint(name) => write!(f, "no such entry point `{name}`"),
            Self::EntryPointIsDeclaration(name) => {
                write!(f, "entry point `{name}` is a declaration, not a definition")
            }
            Self::VersionMismatch { expected, found } => write!(
                f,
                "callback ABI version mismatch: runtime expects v{expected}, artifact built for v{found}"
            ),
            Self::InvalidInputFile(detail) => write!(f, "invalid input file: {detail}"),
            Self::Io(err) => err.fmt(f),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
