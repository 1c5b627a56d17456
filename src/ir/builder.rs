//! A tiny fluent builder for constructing [`crate::ir::Function`] values,
//! used by the sample modules and by tests to avoid hand-numbering
//! [`ValueId`]s.

use crate::abi::PrimitiveType;
use crate::ir::{Address, BasicBlock, Function, Instruction, MemIntrinsicKind, Operand, Param, Type, ValueId};

pub struct FunctionBuilder {
    name: String,
    params: Vec<Param>,
    ret: Option<Type>,
    block: BasicBlock,
    next_value: u32,
}

impl FunctionBuilder {
    #[must_use]
    pub fn new(name: &str) -> Self {
        FunctionBuilder {
            name: name.to_string(),
            params: Vec::new(),
            ret: None,
            block: BasicBlock {
                name: "entry".to_string(),
                insts: Vec::new(),
            },
            next_value: 0,
        }
    }

    #[must_use]
    pub fn param(mut self, name: &str, ty: Type) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            ty,
        });
        self
    }

    #[must_use]
    pub fn returns(mut self, ty: Type) -> Self {
        self.ret = Some(ty);
        self
    }

    fn fresh(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    pub fn alloca(&mut self, name: &str, ty: Type) -> Operand {
        let result = self.fresh();
        self.block.insts.push(Instruction::Alloca {
            result,
            ty,
            name: name.to_string(),
        });
        Operand::Value(result)
    }

    pub fn gep(&mut self, base: Operand, offset: u64) -> Operand {
        if offset == 0 {
            return base;
        }
        let result = self.fresh();
        self.block.insts.push(Instruction::Gep {
            result,
            base,
            offset,
            inbounds: true,
        });
        Operand::Value(result)
    }

    pub fn load(&mut self, addr: Address, ty: Type) -> Operand {
        let result = self.fresh();
        self.block.insts.push(Instruction::Load { result, addr, ty });
        Operand::Value(result)
    }

    pub fn store(&mut self, addr: Address, ty: Type, value: Operand) {
        self.block.insts.push(Instruction::Store { addr, ty, value });
    }

    pub fn memcpy(&mut self, dst: Address, src: Operand, len: Operand) {
        self.block.insts.push(Instruction::MemIntrinsic {
            kind: MemIntrinsicKind::Memcpy,
            dst,
            src_or_val: src,
            len,
        });
    }

    pub fn call(&mut self, callee: &str, args: Vec<Operand>, has_result: bool) -> Option<Operand> {
        let result = if has_result { Some(self.fresh()) } else { None };
        self.block.insts.push(Instruction::Call {
            result,
            callee: callee.to_string(),
            args,
        });
        result.map(Operand::Value)
    }

    pub fn ret(&mut self, value: Option<Operand>) {
        self.block.insts.push(Instruction::Ret { value });
    }

    /// Escape hatch for instruction kinds the builder has no dedicated
    /// helper for yet (atomics, masked vector ops).
    pub fn push(&mut self, inst: Instruction) {
        self.block.insts.push(inst);
    }

    #[must_use]
    pub fn build(self) -> Function {
        Function {
            name: self.name,
            params: self.params,
            ret: self.ret,
            blocks: vec![self.block],
            is_declaration: false,
        }
    }
}

#[must_use]
pub fn i32_ty() -> Type {
    Type::scalar(PrimitiveType::I32)
}

#[must_use]
pub fn ptr_ty() -> Type {
    Type::scalar(PrimitiveType::Ptr)
}
