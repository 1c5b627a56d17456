//! Declaration stubber & global rewriter (SPEC_FULL.md §4.4).
//!
//! Two independent rewrites that share this module because they're the two
//! halves of the same spec component:
//!
//! - **Declaration stubbing**: a declaration the module doesn't define a body
//!   for gets one of three weak bodies, chosen by its return type: void, a
//!   fresh value from the matching `get_<T>` callback, or (for an aggregate
//!   return, not modeled by [`crate::exec`]'s interpreter) a zero-initialized
//!   constant. Intrinsics, recognized library functions and the callback
//!   family itself are left alone — they are either handled directly by
//!   [`crate::lowering`] or call into real, already-defined code.
//! - **Global rewriting**: every external or non-constant global gets a
//!   private companion pointer ([`CompanionGlobal`]) and is reported to
//!   `__input_gen_init`'s plan so the runtime can bind it an address before
//!   the entry wrapper runs.

use crate::abi::{Mode, PrimitiveType};
use crate::ir::{Function, Global, Module, Type, COMPILER_INTERNAL_PREFIX};
use log::debug;

/// What a stubbed declaration's body should do when called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubBody {
    ReturnVoid,
    /// Calls `get_<T>()` and returns the fresh value — the observable effect
    /// is identical to any other fabricated value reaching the function.
    ReturnFresh(PrimitiveType),
    /// Returns a zero-initialized value of the (aggregate) return type.
    ReturnZeroAggregate,
}

/// Functions whose real implementation is assumed linked in rather than
/// stubbed, even though they're declarations from this module's point of
/// view. Kept deliberately small: this crate has no target-library-info
/// database to consult, unlike the instrumentation pass it's grounded on, so
/// only names that would change lowering's behavior if stubbed are listed.
const RECOGNIZED_LIBRARY_FUNCTIONS: &[&str] = &["memcpy", "memmove", "memset", "malloc", "free"];

#[must_use]
pub fn is_recognized_library_function(name: &str) -> bool {
    RECOGNIZED_LIBRARY_FUNCTIONS.contains(&name)
}

#[must_use]
pub fn is_intrinsic(name: &str) -> bool {
    name.starts_with(COMPILER_INTERNAL_PREFIX)
}

/// Decides whether `func` needs a stub body under `mode`, and if so, which
/// kind. Returns `None` for defined functions, intrinsics, callback-prefixed
/// declarations (the runtime itself) and recognized library functions — none
/// of those get rewritten.
#[must_use]
pub fn classify_declaration(func: &Function, mode: Mode) -> Option<StubBody> {
    if !func.is_declaration {
        return None;
    }
    if is_intrinsic(&func.name) {
        return None;
    }
    if func.name.starts_with(mode.prefix()) {
        return None;
    }
    if is_recognized_library_function(&func.name) {
        return None;
    }
    let body = match &func.ret {
        None => StubBody::ReturnVoid,
        Some(Type::Scalar(p)) => StubBody::ReturnFresh(*p),
        Some(_) => StubBody::ReturnZeroAggregate,
    };
    debug!("stubbing declaration `{}` as {body:?}", func.name);
    Some(body)
}

/// One external/non-constant global rewritten under Generate (SPEC_FULL.md
/// §4.4): a private companion pointer global stands in for every in-function
/// use of the original, and the `(address, companion_pointer, size)` tuple
/// below is what the generated `__input_gen_init` reports to the runtime's
/// `global` callback so it can choose to populate or redirect it before the
/// entry wrapper calls the target. This crate has no codegen backend (see
/// `entry::SynthesizedEntry`'s own doc comment for the same reasoning), so
/// "rewriting in-function uses" is this descriptor plus
/// `runtime::RuntimeState::bind_global`, not literal IR mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanionGlobal {
    pub global_name: String,
    pub companion_pointer_name: String,
    pub size: u64,
}

impl CompanionGlobal {
    fn for_global(g: &Global) -> Self {
        CompanionGlobal {
            global_name: g.name.clone(),
            companion_pointer_name: format!("__input_gen_companion_{}", g.name),
            size: g.ty.byte_size(),
        }
    }
}

/// Plans the companion-pointer indirection for every global the fabric is
/// actually responsible for. Mirrors the classifier's own global exclusions
/// (SPEC_FULL.md §4.1): a profiling counter or compiler-internal global is
/// never observed through the fabric either way, so it gets no companion.
#[must_use]
pub fn plan_global_rewrite(module: &Module) -> Vec<CompanionGlobal> {
    module
        .globals
        .iter()
        .filter(|g| g.is_external || !g.is_constant)
        .filter(|g| !g.is_profiling_counter())
        .filter(|g| !g.name.starts_with(COMPILER_INTERNAL_PREFIX))
        .map(CompanionGlobal::for_global)
        .collect()
}
