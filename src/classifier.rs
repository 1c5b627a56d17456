//! Memory-access classifier (SPEC_FULL.md §4.1).
//!
//! Inspects one IR instruction at a time and decides whether it is an
//! "interesting" memory operation the runtime should proxy. Everything else
//! — control flow, arithmetic, calls to other functions — is left untouched
//! by this pass; it is lowering's and the entry synthesizer's job to act on
//! what the classifier finds.

use crate::error::{Error, Result};
use crate::ir::{Address, Function, Instruction, Module, Operand, Origin, Type};
use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    ReadThenWrite,
}

/// One interesting memory access, ready for lowering.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessDescriptor {
    pub addr: Address,
    pub access_ty: Type,
    /// Present iff `kind != Read` (enforced by [`AccessDescriptor::new`]).
    pub value: Option<Operand>,
    pub mask: Option<Operand>,
    pub kind: AccessKind,
    pub underlying: Origin,
}

impl AccessDescriptor {
    fn new(
        func: &Function,
        addr: Address,
        access_ty: Type,
        value: Option<Operand>,
        mask: Option<Operand>,
        kind: AccessKind,
    ) -> Self {
        debug_assert_eq!(
            matches!(kind, AccessKind::Write | AccessKind::ReadThenWrite),
            value.is_some(),
            "write/read-then-write accesses must carry a value, reads must not"
        );
        let underlying = func.underlying_object(&addr.base);
        AccessDescriptor {
            addr,
            access_ty,
            value,
            mask,
            kind,
            underlying,
        }
    }
}

/// Why an instruction was rejected. Not an error: every reason here is a
/// silent skip per SPEC_FULL.md §7 ("Classifier rejection... not an error").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NonZeroAddressSpace,
    SwiftError,
    LocalObject,
    GlobalObject,
    ProfilingCounter,
    CompilerInternal,
    NotAMemoryOp,
}

/// Classifies one instruction.
///
/// `Ok(Some(desc))`: an interesting, accepted access.
/// `Ok(None)`: not interesting, or excluded (see [`Rejection`] for why via
/// [`classify_verbose`]).
/// `Err(_)`: a fatal, unsupported IR shape (scalable vector).
pub fn classify(module: &Module, func: &Function, inst: &Instruction) -> Result<Option<AccessDescriptor>> {
    Ok(classify_verbose(module, func, inst)?.ok())
}

/// Like [`classify`], but surfaces *why* an instruction was rejected,
/// exercised directly by the classifier-soundness test (SPEC_FULL.md §8
/// property 1).
pub fn classify_verbose(
    module: &Module,
    func: &Function,
    inst: &Instruction,
) -> Result<std::result::Result<AccessDescriptor, Rejection>> {
    let (addr, access_ty, value, mask, kind) = match inst {
        Instruction::Load { addr, ty, .. } => (addr, ty.clone(), None, None, AccessKind::Read),
        Instruction::Store { addr, ty, value } => {
            (addr, ty.clone(), Some(value.clone()), None, AccessKind::Write)
        }
        Instruction::AtomicRmw { addr, ty, operand, .. } => (
            addr,
            ty.clone(),
            Some(operand.clone()),
            None,
            AccessKind::ReadThenWrite,
        ),
        Instruction::Cmpxchg { addr, ty, compare, .. } => (
            addr,
            ty.clone(),
            Some(compare.clone()),
            None,
            AccessKind::ReadThenWrite,
        ),
        Instruction::MaskedLoad {
            addr, elem_ty, lanes, mask, ..
        } => (
            addr,
            Type::Vector(Box::new(Type::Scalar(*elem_ty)), *lanes),
            None,
            Some(mask.clone()),
            AccessKind::Read,
        ),
        Instruction::MaskedStore {
            addr,
            elem_ty,
            lanes,
            value,
            mask,
        } => (
            addr,
            Type::Vector(Box::new(Type::Scalar(*elem_ty)), *lanes),
            Some(value.clone()),
            Some(mask.clone()),
            AccessKind::Write,
        ),
        Instruction::MemIntrinsic { .. } => {
            // Handled structurally by lowering (one callback call, not a
            // per-byte access descriptor); not classified as a scalar access.
            return Ok(Err(Rejection::NotAMemoryOp));
        }
        _ => return Ok(Err(Rejection::NotAMemoryOp)),
    };

    if access_ty.is_scalable_vector() {
        return Err(Error::UnsupportedShape {
            function: func.name.clone(),
            detail: "scalable vector memory access is not supported".to_string(),
        });
    }

    if addr.addrspace != 0 {
        trace!("rejecting access in `{}`: non-zero address space {}", func.name, addr.addrspace);
        return Ok(Err(Rejection::NonZeroAddressSpace));
    }
    if addr.swifterror {
        trace!("rejecting access in `{}`: swifterror address", func.name);
        return Ok(Err(Rejection::SwiftError));
    }

    match func.underlying_object(&addr.base) {
        Origin::Local(name) => {
            trace!("rejecting access in `{}`: local object `{name}`", func.name);
            return Ok(Err(Rejection::LocalObject));
        }
        Origin::Global(name) => {
            if let Some(g) = module.global(&name) {
                if g.is_profiling_counter() {
                    trace!("rejecting access in `{}`: `{name}` is a profiling counter", func.name);
                    return Ok(Err(Rejection::ProfilingCounter));
                }
                if g.name.starts_with(crate::ir::COMPILER_INTERNAL_PREFIX) {
                    trace!("rejecting access in `{}`: `{name}` is compiler-internal", func.name);
                    return Ok(Err(Rejection::CompilerInternal));
                }
            }
            trace!("rejecting access in `{}`: global object `{name}`", func.name);
            return Ok(Err(Rejection::GlobalObject));
        }
        Origin::Dynamic => {}
    }

    Ok(Ok(AccessDescriptor::new(
        func,
        addr.clone(),
        access_ty,
        value,
        mask,
        kind,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::{i32_ty, ptr_ty, FunctionBuilder};
    use crate::ir::samples;

    #[test]
    fn plain_load_through_a_parameter_is_interesting() {
        let func = samples::write_then_read();
        let module = samples::wrap_module(func);
        let func = module.function("write_then_read").unwrap();
        let accesses: Vec<_> = func
            .instructions()
            .filter_map(|i| classify(&module, func, i).unwrap())
            .collect();
        assert_eq!(accesses.len(), 2);
        assert_eq!(accesses[0].kind, AccessKind::Write);
        assert!(accesses[0].value.is_some());
        assert_eq!(accesses[1].kind, AccessKind::Read);
        assert!(accesses[1].value.is_none());
    }

    #[test]
    fn access_to_a_local_alloca_is_excluded_not_erroring() {
        let mut b = FunctionBuilder::new("touch_local").returns(i32_ty());
        let local = b.alloca("tmp", i32_ty());
        b.store(Address::generic(local.clone()), i32_ty(), Operand::ConstInt(1));
        let v = b.load(Address::generic(local), i32_ty());
        b.ret(Some(v));
        let func = b.build();
        let module = samples::wrap_module(func);
        let func = module.function("touch_local").unwrap();
        for inst in func.instructions() {
            if matches!(inst, Instruction::Store { .. } | Instruction::Load { .. }) {
                let verdict = classify_verbose(&module, func, inst).unwrap();
                assert_eq!(verdict, Err(Rejection::LocalObject));
            }
        }
    }

    #[test]
    fn swifterror_address_is_excluded() {
        let mut b = FunctionBuilder::new("swifterr").param("p", ptr_ty());
        b.store(
            Address {
                base: Operand::Param(0),
                addrspace: 0,
                swifterror: true,
            },
            i32_ty(),
            Operand::ConstInt(1),
        );
        b.ret(None);
        let func = b.build();
        let module = samples::wrap_module(func);
        let func = module.function("swifterr").unwrap();
        let inst = func.instructions().next().unwrap();
        assert_eq!(
            classify_verbose(&module, func, inst).unwrap(),
            Err(Rejection::SwiftError)
        );
    }

    #[test]
    fn non_zero_address_space_is_excluded() {
        let mut b = FunctionBuilder::new("addrspace").param("p", ptr_ty());
        b.store(
            Address {
                base: Operand::Param(0),
                addrspace: 1,
                swifterror: false,
            },
            i32_ty(),
            Operand::ConstInt(1),
        );
        b.ret(None);
        let func = b.build();
        let module = samples::wrap_module(func);
        let func = module.function("addrspace").unwrap();
        let inst = func.instructions().next().unwrap();
        assert_eq!(
            classify_verbose(&module, func, inst).unwrap(),
            Err(Rejection::NonZeroAddressSpace)
        );
    }

    #[test]
    fn scalable_vector_access_is_a_fatal_error() {
        let mut b = FunctionBuilder::new("scalable").param("p", ptr_ty());
        b.store(
            Address::generic(Operand::Param(0)),
            Type::ScalableVector(Box::new(i32_ty())),
            Operand::ConstInt(1),
        );
        b.ret(None);
        let func = b.build();
        let module = samples::wrap_module(func);
        let func = module.function("scalable").unwrap();
        let inst = func.instructions().next().unwrap();
        assert!(classify(&module, func, inst).is_err());
    }

    fn global_access_module(global: crate::ir::Global) -> Module {
        let mut b = FunctionBuilder::new("touch_global").returns(i32_ty());
        let v = b.load(Address::generic(Operand::GlobalRef(global.name.clone())), i32_ty());
        b.ret(Some(v));
        let func = b.build();
        let mut module = samples::wrap_module(func);
        module.globals.push(global);
        module
    }

    #[test]
    fn plain_global_object_is_excluded() {
        let module = global_access_module(crate::ir::Global {
            name: "counter".to_string(),
            ty: i32_ty(),
            is_constant: false,
            is_external: true,
            section: None,
        });
        let func = module.function("touch_global").unwrap();
        let inst = func.instructions().next().unwrap();
        assert_eq!(
            classify_verbose(&module, func, inst).unwrap(),
            Err(Rejection::GlobalObject)
        );
    }

    #[test]
    fn profiling_counter_global_is_excluded() {
        let module = global_access_module(crate::ir::Global {
            name: "counter".to_string(),
            ty: i32_ty(),
            is_constant: false,
            is_external: true,
            section: Some("__llvm_prf_cnts".to_string()),
        });
        let func = module.function("touch_global").unwrap();
        let inst = func.instructions().next().unwrap();
        assert_eq!(
            classify_verbose(&module, func, inst).unwrap(),
            Err(Rejection::ProfilingCounter)
        );
    }

    #[test]
    fn compiler_internal_global_is_excluded() {
        let module = global_access_module(crate::ir::Global {
            name: "llvm.global_ctors".to_string(),
            ty: i32_ty(),
            is_constant: false,
            is_external: true,
            section: None,
        });
        let func = module.function("touch_global").unwrap();
        let inst = func.instructions().next().unwrap();
        assert_eq!(
            classify_verbose(&module, func, inst).unwrap(),
            Err(Rejection::CompilerInternal)
        );
    }

    #[test]
    fn atomic_rmw_observed_value_is_the_rmw_operand() {
        let mut b = FunctionBuilder::new("rmw").param("p", ptr_ty()).returns(i32_ty());
        b.ret(None);
        let mut func = b.build();
        // Construct the atomicrmw by hand; the builder has no helper for it.
        func.blocks[0].insts.insert(
            0,
            Instruction::AtomicRmw {
                result: crate::ir::ValueId(999),
                addr: Address::generic(Operand::Param(0)),
                ty: i32_ty(),
                operand: Operand::ConstInt(7),
            },
        );
        let module = samples::wrap_module(func);
        let func = module.function("rmw").unwrap();
        let inst = &func.blocks[0].insts[0];
        let desc = classify(&module, func, inst).unwrap().unwrap();
        assert_eq!(desc.kind, AccessKind::ReadThenWrite);
        assert_eq!(desc.value, Some(Operand::ConstInt(7)));
    }
}
