//! Module pruner (SPEC_FULL.md §4.5).
//!
//! Under Generate/Record, anything in the module besides the target function
//! and whatever it can reach is dead weight — no other entry point will ever
//! call it, and the entry-point synthesizer only instruments the one target.
//! Liveness here is a simple reachability walk over direct calls; this crate
//! has no pointer-argument memory-behavior analysis to refine it beyond that
//! (the distilled spec mentions one only to justify deletion being safe, not
//! as an operation this crate must reproduce).

use crate::ir::{Instruction, Module};
use std::collections::HashSet;

/// Returns the set of function names reachable from `root` by following
/// direct `Call` instructions, including `root` itself.
#[must_use]
pub fn reachable_from(module: &Module, root: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut stack = vec![root.to_string()];
    while let Some(name) = stack.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        let Some(func) = module.function(&name) else {
            continue;
        };
        for inst in func.instructions() {
            if let Instruction::Call { callee, .. } = inst {
                if !seen.contains(callee) {
                    stack.push(callee.clone());
                }
            }
        }
    }
    seen
}

/// Removes every function from `module` that is neither `entry` nor
/// reachable from it, keeping declarations reachable from the target (the
/// stubber still needs to see them) and dropping everything else, including
/// other defined-but-dead functions.
pub fn prune(module: &mut Module, entry: &str) {
    let keep = reachable_from(module, entry);
    module.functions.retain(|f| keep.contains(&f.name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::samples;

    #[test]
    fn dead_helper_is_removed_target_and_callee_survive() {
        let func = samples::add_vectors(1);
        let mut module = samples::wrap_module(func);
        assert!(module.function("dead_helper").is_some());
        prune(&mut module, "add");
        assert!(module.function("dead_helper").is_none());
        assert!(module.function("add").is_some());
        assert!(module.function("add_i32").is_some(), "a callee the target reaches must survive even as a declaration");
    }

    #[test]
    fn a_target_with_no_calls_keeps_only_itself() {
        let func = samples::write_then_read();
        let mut module = samples::wrap_module(func);
        prune(&mut module, "write_then_read");
        assert_eq!(module.functions.len(), 1);
    }
}
