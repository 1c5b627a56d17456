//! A small, explicit in-memory IR model.
//!
//! Reading and writing real LLVM bitcode or textual IR is out of scope for
//! this system (SPEC_FULL.md §1): the instrumentation transform operates on
//! an already-parsed module, however it got there. This module is that
//! module: functions, basic blocks and a handful of instruction kinds, just
//! rich enough to carry every shape the classifier and lowering passes need
//! to reason about (address spaces, `swifterror`, aggregate and vector
//! types, masked memory ops, memory intrinsics).

pub mod builder;
pub mod samples;

use crate::abi::PrimitiveType;
use std::collections::HashMap;

/// An SSA-ish value identifier, unique within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// A type as seen by the classifier and lowering passes.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Scalar(PrimitiveType),
    Struct(Vec<Type>),
    Array(Box<Type>, usize),
    /// A fixed-length vector, e.g. `<4 x i32>`.
    Vector(Box<Type>, usize),
    /// A scalable vector (`<vscale x 4 x i32>`). Always rejected by lowering
    /// — an explicit non-goal (SPEC_FULL.md §1).
    ScalableVector(Box<Type>),
}

impl Type {
    #[must_use]
    pub fn scalar(ty: PrimitiveType) -> Self {
        Type::Scalar(ty)
    }

    /// Byte size of the type, assuming no interior padding (leaf sizes
    /// summed/multiplied — good enough to size stack slots and bump
    /// allocations without a target data layout).
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        match self {
            Type::Scalar(p) => p.byte_size(),
            Type::Struct(fields) => fields.iter().map(Type::byte_size).sum(),
            Type::Array(elt, n) => elt.byte_size() * *n as u64,
            Type::Vector(elt, n) => elt.byte_size() * *n as u64,
            Type::ScalableVector(_) => 0,
        }
    }

    /// Recursively flattens a (non-scalable) type into its leaf scalar
    /// fields, each tagged with its byte offset from the start of the
    /// access. Mirrors the struct-field-via-GEP / array-element-via-GEP
    /// decomposition the real transform performs with constant-index GEPs.
    #[must_use]
    pub fn leaves(&self) -> Vec<(PrimitiveType, u64)> {
        let mut out = Vec::new();
        self.leaves_into(0, &mut out);
        out
    }

    fn leaves_into(&self, base_offset: u64, out: &mut Vec<(PrimitiveType, u64)>) {
        match self {
            Type::Scalar(p) => out.push((*p, base_offset)),
            Type::Struct(fields) => {
                let mut offset = base_offset;
                for field in fields {
                    field.leaves_into(offset, out);
                    offset += field.byte_size();
                }
            }
            Type::Array(elt, n) | Type::Vector(elt, n) => {
                let stride = elt.byte_size();
                for i in 0..*n {
                    elt.leaves_into(base_offset + i as u64 * stride, out);
                }
            }
            Type::ScalableVector(_) => {}
        }
    }

    #[must_use]
    pub fn is_scalable_vector(&self) -> bool {
        matches!(self, Type::ScalableVector(_))
    }

    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Type::Struct(_) | Type::Array(_, _) | Type::Vector(_, _))
    }
}

/// Where a pointer operand ultimately comes from, after peeling any chain
/// of constant-offset GEPs. The classifier only proxies memory reachable
/// through [`Origin::Dynamic`] addresses (parameters, loaded pointers,
/// fabricated objects) — a [`Origin::Local`] or [`Origin::Global`] base is
/// provided directly by the function/module itself, not by the fabric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Local(String),
    Global(String),
    Dynamic,
}

/// An operand: either a compile-time constant, a reference to a function
/// parameter or stack slot or global, the result of a previous instruction,
/// or (post-lowering) a byte offset into a previously computed address.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    ConstInt(i64),
    ConstFloat(f64),
    Param(usize),
    Alloca(String),
    GlobalRef(String),
    Value(ValueId),
    /// Introduced by lowering: `base + offset` addressing for a decomposed
    /// aggregate field or array/vector element.
    FieldOffset { base: Box<Operand>, offset: u64 },
}

impl Operand {
    #[must_use]
    pub fn field(base: Operand, offset: u64) -> Self {
        if offset == 0 {
            base
        } else {
            Operand::FieldOffset {
                base: Box::new(base),
                offset,
            }
        }
    }
}

/// An address operand together with the address-space qualifications the
/// classifier must check.
#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    pub base: Operand,
    pub addrspace: u32,
    pub swifterror: bool,
}

impl Address {
    #[must_use]
    pub fn generic(base: Operand) -> Self {
        Address {
            base,
            addrspace: 0,
            swifterror: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemIntrinsicKind {
    Memcpy,
    Memmove,
    Memset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Alloca {
        result: ValueId,
        ty: Type,
        name: String,
    },
    Load {
        result: ValueId,
        addr: Address,
        ty: Type,
    },
    Store {
        addr: Address,
        ty: Type,
        value: Operand,
    },
    /// Atomic read-modify-write. The observed "value" is the RMW operand.
    AtomicRmw {
        result: ValueId,
        addr: Address,
        ty: Type,
        operand: Operand,
    },
    /// Atomic compare-and-swap. The observed "value" is the compare operand.
    Cmpxchg {
        result: ValueId,
        addr: Address,
        ty: Type,
        compare: Operand,
        new: Operand,
    },
    MaskedLoad {
        result: ValueId,
        addr: Address,
        elem_ty: PrimitiveType,
        lanes: usize,
        mask: Operand,
    },
    MaskedStore {
        addr: Address,
        elem_ty: PrimitiveType,
        lanes: usize,
        value: Operand,
        mask: Operand,
    },
    MemIntrinsic {
        kind: MemIntrinsicKind,
        dst: Address,
        /// The source address for memcpy/memmove, or the fill byte for memset.
        src_or_val: Operand,
        len: Operand,
    },
    /// A constant-offset GEP, the only kind lowering needs to peel to find
    /// an access's underlying object.
    Gep {
        result: ValueId,
        base: Operand,
        offset: u64,
        inbounds: bool,
    },
    Call {
        result: Option<ValueId>,
        callee: String,
        args: Vec<Operand>,
    },
    Ret {
        value: Option<Operand>,
    },
}

impl Instruction {
    #[must_use]
    pub fn result(&self) -> Option<ValueId> {
        match self {
            Instruction::Alloca { result, .. }
            | Instruction::Load { result, .. }
            | Instruction::AtomicRmw { result, .. }
            | Instruction::Cmpxchg { result, .. }
            | Instruction::MaskedLoad { result, .. }
            | Instruction::Gep { result, .. } => Some(*result),
            Instruction::Call { result, .. } => *result,
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub name: String,
    pub insts: Vec<Instruction>,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Option<Type>,
    pub blocks: Vec<BasicBlock>,
    pub is_declaration: bool,
}

impl Function {
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| b.insts.iter())
    }

    /// Looks up the instruction that produced `id`, used to peel GEP chains
    /// back to their base.
    #[must_use]
    pub fn producer(&self, id: ValueId) -> Option<&Instruction> {
        self.instructions().find(|inst| inst.result() == Some(id))
    }

    /// Resolves an operand's underlying object, peeling any chain of
    /// constant-offset GEPs (SPEC_FULL.md §4.1: "after peeling inbounds
    /// offsets").
    #[must_use]
    pub fn underlying_object(&self, operand: &Operand) -> Origin {
        match operand {
            Operand::Alloca(name) => Origin::Local(name.clone()),
            Operand::GlobalRef(name) => Origin::Global(name.clone()),
            Operand::FieldOffset { base, .. } => self.underlying_object(base),
            Operand::Value(id) => match self.producer(*id) {
                Some(Instruction::Gep { base, .. }) => self.underlying_object(base),
                Some(Instruction::Alloca { name, .. }) => Origin::Local(name.clone()),
                _ => Origin::Dynamic,
            },
            Operand::Param(_) | Operand::ConstInt(_) | Operand::ConstFloat(_) => Origin::Dynamic,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    pub is_constant: bool,
    pub is_external: bool,
    /// e.g. `Some("__llvm_prf_cnts")` for a profiling-counters section.
    pub section: Option<String>,
}

impl Global {
    #[must_use]
    pub fn is_profiling_counter(&self) -> bool {
        self.section
            .as_deref()
            .is_some_and(|s| s.contains("prf_cnts") || s.contains("prf_data"))
    }
}

/// Prefix reserved for compiler-internal globals (e.g. vtables, typeinfo),
/// excluded from classification the same way profiling counters are.
pub const COMPILER_INTERNAL_PREFIX: &str = "llvm.";

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
}

impl Module {
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    #[must_use]
    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Maps function name to its index, used by the pruner's reachability
    /// walk and by `--entry <index>` selection.
    #[must_use]
    pub fn function_index(&self) -> HashMap<&str, usize> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.as_str(), i))
            .collect()
    }
}
