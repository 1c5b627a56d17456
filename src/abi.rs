//! Callback ABI registry.
//!
//! Single source of truth for the naming and signature convention shared by
//! the instrumentation transform (which *emits* calls to these symbols) and
//! the lazy heap runtime (which *implements* them). See `SPEC_FULL.md` §4.
//! Dispatch over the ten primitive types is a tagged-variant match, not
//! virtual dispatch: adding a type means extending [`PrimitiveType::ALL`]
//! and handling the new arm everywhere it is matched on.

use num_enum::TryFromPrimitive;

/// The ten primitive types the callback ABI is specialized over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum PrimitiveType {
    I1 = 0,
    I8,
    I16,
    I32,
    I64,
    I128,
    Ptr,
    Float,
    Double,
    /// 80-bit x86 extended precision float, stored padded to 16 bytes.
    X86Fp80,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 10] = [
        PrimitiveType::I1,
        PrimitiveType::I8,
        PrimitiveType::I16,
        PrimitiveType::I32,
        PrimitiveType::I64,
        PrimitiveType::I128,
        PrimitiveType::Ptr,
        PrimitiveType::Float,
        PrimitiveType::Double,
        PrimitiveType::X86Fp80,
    ];

    /// Name fragment used to build callback symbols, e.g. `i32`, `ptr`.
    #[must_use]
    pub fn symbol_fragment(self) -> &'static str {
        match self {
            Self::I1 => "i1",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::I128 => "i128",
            Self::Ptr => "ptr",
            Self::Float => "float",
            Self::Double => "double",
            Self::X86Fp80 => "x86_fp80",
        }
    }

    /// In-memory storage size. `x86_fp80` is allotted the full primitive
    /// slot width (16 bytes) rather than its packed 10-byte encoding, matching
    /// `MaxPrimitiveTypeSize` in the original runtime.
    #[must_use]
    pub fn byte_size(self) -> u64 {
        match self {
            Self::I1 | Self::I8 => 1,
            Self::I16 => 2,
            Self::I32 | Self::Float => 4,
            Self::I64 | Self::Double | Self::Ptr => 8,
            Self::I128 | Self::X86Fp80 => 16,
        }
    }

    #[must_use]
    pub fn is_pointer(self) -> bool {
        matches!(self, Self::Ptr)
    }
}

/// The three cooperating instrumentation modes. Exactly one is active in any
/// given compiled artifact, and its prefix is carried by every callback
/// symbol the artifact references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Record,
    Generate,
    Run,
}

impl Mode {
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Record => "__record_",
            Self::Generate => "__inputgen_",
            Self::Run => "__inputrun_",
        }
    }
}

/// Current callback ABI version. Bumped whenever a callback's signature or
/// meaning changes; `version_mismatch_check_v<N>` encodes it in the symbol
/// name so a stale runtime simply fails to link (or, in this crate, fails
/// [`crate::exec`] with [`crate::error::Error::VersionMismatch`]).
pub const ABI_VERSION: u32 = 1;

/// The kind tag carried by every access callback invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKindCode {
    Read = 0,
    Write = 1,
    ReadThenWrite = 2,
}

/// Number of parameters an `access_<T>` callback takes:
/// `(address, value, size, object_base, kind, hint_ptr, hint_count)`.
/// The trailing two are a reserved, currently-zero hint channel
/// (see SPEC_FULL.md §9).
pub const ACCESS_CALLBACK_ARITY: usize = 7;

/// Builds the mode-prefixed symbol name for one of the per-type callbacks.
#[must_use]
pub fn access_symbol(mode: Mode, ty: PrimitiveType) -> String {
    format!("{}access_{}", mode.prefix(), ty.symbol_fragment())
}

#[must_use]
pub fn get_symbol(mode: Mode, ty: PrimitiveType) -> String {
    format!("{}get_{}", mode.prefix(), ty.symbol_fragment())
}

#[must_use]
pub fn arg_symbol(mode: Mode, ty: PrimitiveType) -> String {
    format!("{}arg_{}", mode.prefix(), ty.symbol_fragment())
}

/// Fixed (non type-indexed) callback names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedCallback {
    Memmove,
    Memcpy,
    Memset,
    TranslatePtr,
    Push,
    Pop,
    Init,
    Deinit,
    Global,
}

impl FixedCallback {
    fn fragment(self) -> &'static str {
        match self {
            Self::Memmove => "memmove",
            Self::Memcpy => "memcpy",
            Self::Memset => "memset",
            Self::TranslatePtr => "translate_ptr",
            Self::Push => "push",
            Self::Pop => "pop",
            Self::Init => "init",
            Self::Deinit => "deinit",
            Self::Global => "global",
        }
    }
}

#[must_use]
pub fn fixed_symbol(mode: Mode, callback: FixedCallback) -> String {
    format!("{}{}", mode.prefix(), callback.fragment())
}

#[must_use]
pub fn version_check_symbol(version: u32) -> String {
    format!("version_mismatch_check_v{version}")
}

/// Entry point symbol, optionally qualified by the target function's name
/// (`entry` or `entry_<funcname>`).
#[must_use]
pub fn entry_symbol(function_name: Option<&str>) -> String {
    match function_name {
        Some(name) => format!("entry_{name}"),
        None => "entry".to_string(),
    }
}
