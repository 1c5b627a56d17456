//! Worked example modules, standing in for "a function extracted from a
//! compiled program" — this crate does not parse real IR files (see
//! SPEC_FULL.md §1), so the CLI binaries and several integration tests
//! exercise the pipeline against functions built here instead.

use crate::ir::builder::{i32_ty, ptr_ty, FunctionBuilder};
use crate::ir::{Address, Function, Module, Operand};

/// `void add(int *a, int *b, int *c, int n)` — `c[i] = a[i] + b[i]` unrolled
/// to a handful of iterations worth of loads/stores (no loop construct in
/// this IR model; the instrumentation pipeline treats a straight-line
/// unrolling identically to a real loop body). Used by the S1 scenario.
#[must_use]
pub fn add_vectors(unroll: usize) -> Function {
    let mut b = FunctionBuilder::new("add")
        .param("a", ptr_ty())
        .param("b", ptr_ty())
        .param("c", ptr_ty())
        .param("n", i32_ty());
    for i in 0..unroll {
        let offset = (i * 4) as u64;
        let a_i = b.gep(Operand::Param(0), offset);
        let b_i = b.gep(Operand::Param(1), offset);
        let c_i = b.gep(Operand::Param(2), offset);
        let av = b.load(Address::generic(a_i), i32_ty());
        let bv = b.load(Address::generic(b_i), i32_ty());
        let sum = b.call("add_i32", vec![av, bv], true).unwrap();
        b.store(Address::generic(c_i), i32_ty(), sum);
    }
    b.ret(None);
    b.build()
}

/// `int deref2(int **pp)` — dereferences `pp` to get a pointer, then
/// dereferences that. Used by the S2 (chained artificial objects) scenario.
#[must_use]
pub fn chained_pointer_deref() -> Function {
    let mut b = FunctionBuilder::new("deref2").param("pp", ptr_ty()).returns(i32_ty());
    let inner = b.load(Address::generic(Operand::Param(0)), ptr_ty());
    let value = b.load(Address::generic(inner), i32_ty());
    b.ret(Some(value));
    b.build()
}

/// `int write_then_read(int *a)` — stores to `a[0]` then reads it back.
/// Used by the S3 (written bits dominate) scenario.
#[must_use]
pub fn write_then_read() -> Function {
    let mut b = FunctionBuilder::new("write_then_read").param("a", ptr_ty()).returns(i32_ty());
    b.store(Address::generic(Operand::Param(0)), i32_ty(), Operand::ConstInt(42));
    let value = b.load(Address::generic(Operand::Param(0)), i32_ty());
    b.ret(Some(value));
    b.build()
}

/// `int sum16(int *a)` — reads a 16-element `i32` array. Used by the S4
/// scenario.
#[must_use]
pub fn sum_array(len: usize) -> Function {
    let mut b = FunctionBuilder::new("sum16").param("a", ptr_ty()).returns(i32_ty());
    let mut acc: Option<Operand> = None;
    for i in 0..len {
        let addr = b.gep(Operand::Param(0), (i * 4) as u64);
        let v = b.load(Address::generic(addr), i32_ty());
        acc = Some(match acc {
            None => v,
            Some(prev) => b.call("add_i32", vec![prev, v], true).unwrap(),
        });
    }
    b.ret(acc);
    b.build()
}

/// `int ignore_arg(int x, int *a)` — never touches `x`. Used by the S5
/// scenario.
#[must_use]
pub fn ignore_one_arg() -> Function {
    let mut b = FunctionBuilder::new("ignore_arg")
        .param("x", i32_ty())
        .param("a", ptr_ty())
        .returns(i32_ty());
    let value = b.load(Address::generic(Operand::Param(1)), i32_ty());
    b.ret(Some(value));
    b.build()
}

/// `void copy32(char *dst, char *src)` — a single `memcpy` of 32 bytes.
/// Used by the S6 scenario.
#[must_use]
pub fn memcpy32() -> Function {
    let mut b = FunctionBuilder::new("copy32").param("dst", ptr_ty()).param("src", ptr_ty());
    b.memcpy(
        Address::generic(Operand::Param(0)),
        Operand::Param(1),
        Operand::ConstInt(32),
    );
    b.ret(None);
    b.build()
}

/// A module with the one function passed in, plus a handful of unreachable
/// helper functions (used to exercise the module pruner) and an
/// uninstrumented `add_i32` library-ish declaration.
#[must_use]
pub fn wrap_module(target: Function) -> Module {
    let mut module = Module::default();
    module.functions.push(target);
    module.functions.push(Function {
        name: "add_i32".to_string(),
        params: vec![
            crate::ir::Param {
                name: "x".into(),
                ty: i32_ty(),
            },
            crate::ir::Param {
                name: "y".into(),
                ty: i32_ty(),
            },
        ],
        ret: Some(i32_ty()),
        blocks: vec![],
        is_declaration: true,
    });
    module.functions.push(Function {
        name: "dead_helper".to_string(),
        params: vec![],
        ret: None,
        blocks: vec![crate::ir::BasicBlock {
            name: "entry".into(),
            insts: vec![crate::ir::Instruction::Ret { value: None }],
        }],
        is_declaration: false,
    });
    module
}

/// Every sample by name, for the CLI `--sample` flag.
#[must_use]
pub fn by_name(name: &str) -> Option<Function> {
    match name {
        "add_vectors" => Some(add_vectors(4)),
        "chained_pointer_deref" => Some(chained_pointer_deref()),
        "write_then_read" => Some(write_then_read()),
        "sum_array" => Some(sum_array(16)),
        "ignore_one_arg" => Some(ignore_one_arg()),
        "memcpy32" => Some(memcpy32()),
        _ => None,
    }
}

pub const SAMPLE_NAMES: &[&str] = &[
    "add_vectors",
    "chained_pointer_deref",
    "write_then_read",
    "sum_array",
    "ignore_one_arg",
    "memcpy32",
];
