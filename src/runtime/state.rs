//! Per-seed runtime state (SPEC_FULL.md §3 "Runtime state").

use crate::abi::PrimitiveType;
use crate::runtime::region::{HeapRegion, DEFAULT_REGION_SIZE};
use crate::runtime::value::{self, Scalar, DEFAULT_INT_CEILING};
use crate::runtime::Object;
use log::trace;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::collections::HashMap;
use std::path::PathBuf;

/// Default size of a freshly fabricated pointee object (SPEC_FULL.md §4.6).
pub const DEFAULT_OBJECT_SIZE: u64 = 1024 * 1024;
const OBJECT_ALIGNMENT: u64 = 16;
/// Probability (out of 1000) that a fabricated pointer is non-null,
/// matching the original runtime's `rand() % 1000` gate.
const POINTER_NON_NULL_NUM: u32 = 999;

fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

/// One generator thread's/seed's private runtime: its own RNG, heap chain,
/// object list and argument vector. Constructed at entry-point start,
/// destroyed (triggering serialization, see [`crate::serializer`]) at
/// return. No state is ever shared across seeds (SPEC_FULL.md §5).
pub struct RuntimeState {
    pub seed: i64,
    rng: Pcg64Mcg,
    pub output_dir: String,
    pub executable_path: PathBuf,
    pub args: Vec<u64>,
    /// Objects in discovery (insertion) order — the serializer relies on
    /// this order to assign file offsets (SPEC_FULL.md §4.7/§9).
    pub objects: Vec<Object>,
    current: HeapRegion,
    bump_cursor: u64,
    next_region_base: u64,
    region_capacity: u64,
    /// Record-mode push/pop bracket nesting (SPEC_FULL.md §4.3); entries are
    /// the function name that was pushed.
    push_stack: Vec<String>,
    pub num_new_values: u64,
    /// Companion-pointer addresses bound by `__input_gen_init`'s `global`
    /// callback (SPEC_FULL.md §4.4), keyed by the original global's name.
    globals: HashMap<String, u64>,
    globals_initialized: bool,
}

impl RuntimeState {
    #[must_use]
    pub fn new(seed: i64, output_dir: &str, executable_path: impl Into<PathBuf>) -> Self {
        Self::with_region_capacity(seed, output_dir, executable_path, DEFAULT_REGION_SIZE)
    }

    #[must_use]
    pub fn with_region_capacity(
        seed: i64,
        output_dir: &str,
        executable_path: impl Into<PathBuf>,
        region_capacity: u64,
    ) -> Self {
        let region = HeapRegion::new(0, region_capacity, None);
        RuntimeState {
            seed,
            rng: Pcg64Mcg::seed_from_u64(seed as u64),
            output_dir: output_dir.to_string(),
            executable_path: executable_path.into(),
            args: Vec::new(),
            objects: Vec::new(),
            bump_cursor: 0,
            next_region_base: region_capacity,
            region_capacity,
            current: region,
            push_stack: Vec::new(),
            num_new_values: 0,
            globals: HashMap::new(),
            globals_initialized: false,
        }
    }

    /// Builds the runtime a Run-mode replay starts from: a region pre-loaded
    /// with a deserialized (and already-relocated) input file's memory at
    /// `load_base`, so first-touch fabrication never runs for bytes the file
    /// already pins down. `pointer_slots` are the absolute addresses of the
    /// memory relocations that file carried, re-registered in the pointer
    /// map so the loaded state looks exactly like one this crate had
    /// fabricated itself.
    #[must_use]
    pub fn for_replay(
        seed: i64,
        output_dir: &str,
        executable_path: impl Into<PathBuf>,
        load_base: u64,
        memory: &[u8],
        pointer_slots: &[u64],
    ) -> Self {
        Self::for_replay_with_region_capacity(seed, output_dir, executable_path, load_base, memory, pointer_slots, DEFAULT_REGION_SIZE)
    }

    #[must_use]
    pub fn for_replay_with_region_capacity(
        seed: i64,
        output_dir: &str,
        executable_path: impl Into<PathBuf>,
        load_base: u64,
        memory: &[u8],
        pointer_slots: &[u64],
        region_capacity: u64,
    ) -> Self {
        let capacity = (memory.len() as u64).max(region_capacity);
        let mut region = HeapRegion::new(load_base, capacity, None);
        region.import(load_base, memory);
        for &location in pointer_slots {
            let bytes: [u8; 8] = region.read_bytes(location, 8).try_into().expect("pointer slot is 8 bytes");
            region.record_pointer(location, u64::from_le_bytes(bytes));
        }
        RuntimeState {
            seed,
            rng: Pcg64Mcg::seed_from_u64(seed as u64),
            output_dir: output_dir.to_string(),
            executable_path: executable_path.into(),
            args: Vec::new(),
            objects: Vec::new(),
            bump_cursor: load_base + memory.len() as u64,
            next_region_base: load_base + capacity,
            region_capacity,
            current: region,
            push_stack: Vec::new(),
            num_new_values: 0,
            globals: HashMap::new(),
            globals_initialized: false,
        }
    }

    /// Whether `__input_gen_init` has already run for this seed — it's
    /// invoked once, from the entry shim, not on every recursive call into
    /// [`crate::exec::run`].
    #[must_use]
    pub fn globals_initialized(&self) -> bool {
        self.globals_initialized
    }

    pub fn mark_globals_initialized(&mut self) {
        self.globals_initialized = true;
    }

    /// Records the companion-pointer address `__input_gen_init` fabricated
    /// for `global_name` (SPEC_FULL.md §4.4's `global` callback).
    pub fn bind_global(&mut self, global_name: &str, companion_addr: u64) {
        trace!("bound global `{global_name}` to companion address 0x{companion_addr:x}");
        self.globals.insert(global_name.to_string(), companion_addr);
    }

    /// The companion-pointer address a rewritten in-function use of
    /// `global_name` reloads from, if `__input_gen_init` has bound one.
    #[must_use]
    pub fn global_address(&self, global_name: &str) -> Option<u64> {
        self.globals.get(global_name).copied()
    }

    pub fn push(&mut self, function_name: &str) {
        self.push_stack.push(function_name.to_string());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.push_stack.pop()
    }

    /// Bump-allocates a new object (16-byte aligned), chaining a fresh
    /// region if the current one cannot fit it (SPEC_FULL.md §4.6).
    pub fn allocate_object(&mut self, size: u64, artificial: bool) -> u64 {
        let size = align_up(size.max(1), OBJECT_ALIGNMENT);
        if self.bump_cursor + size > self.current.end() {
            let capacity = size.max(self.region_capacity);
            let base = self.next_region_base;
            self.next_region_base += capacity;
            let old = std::mem::replace(&mut self.current, HeapRegion::new(base, capacity, None));
            self.current.prev = Some(Box::new(old));
            self.bump_cursor = base;
        }
        let base = self.bump_cursor;
        self.bump_cursor += size;
        self.objects.push(Object { base, size, artificial });
        base
    }

    fn region_for_mut(&mut self, addr: u64) -> Option<&mut HeapRegion> {
        let mut region = &mut self.current;
        loop {
            if region.contains_range(addr, 1) {
                return Some(region);
            }
            match &mut region.prev {
                Some(prev) => region = prev,
                None => return None,
            }
        }
    }

    fn region_for(&self, addr: u64) -> Option<&HeapRegion> {
        let mut region = &self.current;
        loop {
            if region.contains_range(addr, 1) {
                return Some(region);
            }
            match &region.prev {
                Some(prev) => region = prev,
                None => return None,
            }
        }
    }

    /// First-touch read (SPEC_FULL.md §4.6). An address outside every
    /// tracked region reads as zero bytes — the Rust-idiomatic stand-in for
    /// "whatever was already in real process memory" (this runtime has no
    /// backing process image of its own; see DESIGN.md).
    pub fn read(&mut self, addr: u64, ty: PrimitiveType) -> Scalar {
        let size = ty.byte_size();
        if self.region_for(addr).is_none() {
            return Scalar::from_le_bytes(ty, &vec![0u8; size as usize]);
        }
        let used = self.region_for(addr).unwrap().is_used(addr, size);
        if !used {
            trace!("first-touch fabricating a {ty:?} at 0x{addr:x}");
            let fresh = self.get_new_value(ty);
            self.write(addr, fresh, true);
        }
        let region = self.region_for(addr).unwrap();
        Scalar::from_le_bytes(ty, region.read_bytes(addr, size))
    }

    /// Write (SPEC_FULL.md §4.6). Out-of-bounds writes are silently dropped
    /// — a deliberate soft-failure policy (see the call site in
    /// [`crate::exec`]) chosen over aborting so a fuzzily-generated input
    /// stays productive rather than crashing the generator.
    pub fn write(&mut self, addr: u64, value: Scalar, due_to_read: bool) {
        let bytes = value.to_le_bytes();
        let size = bytes.len() as u64;
        let Some(region) = self.region_for_mut(addr) else {
            return;
        };
        region.mark_used(addr, size);
        region.write_bytes(addr, &bytes);
        if due_to_read {
            if let Scalar::Ptr(target) = value {
                region.record_pointer(addr, target);
            }
        }
    }

    /// Tagged-variant value synthesis (SPEC_FULL.md §4.6). Pointers get a
    /// fresh artificial object with small probability of null; everything
    /// else is a bounded pseudo-random scalar.
    pub fn get_new_value(&mut self, ty: PrimitiveType) -> Scalar {
        self.num_new_values += 1;
        if ty == PrimitiveType::Ptr {
            if self.rng.gen_range(0..1000) >= POINTER_NON_NULL_NUM {
                return Scalar::Ptr(0);
            }
            let base = self.allocate_object(DEFAULT_OBJECT_SIZE, true);
            return Scalar::Ptr(base);
        }
        value::synthesize_non_pointer(&mut self.rng, ty, DEFAULT_INT_CEILING)
    }

    /// Fabricates and records one argument (SPEC_FULL.md §4.3 Generate-mode
    /// `arg_<T>()`).
    pub fn fabricate_arg(&mut self, ty: PrimitiveType) -> Scalar {
        let value = self.get_new_value(ty);
        self.args.push(value.bit_pattern_as_u64().unwrap_or_else(|| {
            value.as_i64_bits().map(|v| v as u64).unwrap_or(0)
        }));
        value
    }

    /// Records an observed argument without re-fabricating it (Record-mode
    /// `arg_<T>(value)` tap).
    pub fn observe_arg(&mut self, value: Scalar) {
        self.args
            .push(value.bit_pattern_as_u64().unwrap_or_else(|| value.as_i64_bits().map(|v| v as u64).unwrap_or(0)));
    }

    /// Remaps a recorded address for Run mode (SPEC_FULL.md §4.2). Identity
    /// here: a replayed input's memory arrives already relocated into this
    /// process's address space at deserialization time (see
    /// [`crate::serializer`]), so there is nothing left to translate by the
    /// time `exec` runs — unlike the original runtime, which relocates
    /// lazily on first touch. Recorded as an Open Question resolution in
    /// DESIGN.md.
    #[must_use]
    pub fn translate_ptr(&self, addr: u64) -> u64 {
        addr
    }

    /// Walks the region chain outermost-first (oldest region last), used by
    /// the serializer to enumerate every region's pointer map.
    #[must_use]
    pub fn regions(&self) -> Vec<&HeapRegion> {
        let mut out = Vec::new();
        let mut region = Some(&self.current);
        while let Some(r) = region {
            out.push(r);
            region = r.prev.as_deref();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_observes_the_written_value_not_a_fresh_one() {
        let mut rt = RuntimeState::with_region_capacity(0, "-", "t", 4096);
        let addr = rt.allocate_object(16, false);
        rt.write(addr, Scalar::I32(42), false);
        assert_eq!(rt.read(addr, PrimitiveType::I32), Scalar::I32(42));
    }

    #[test]
    fn first_touch_read_fabricates_and_marks_used() {
        let mut rt = RuntimeState::with_region_capacity(1, "-", "t", 4096);
        let addr = rt.allocate_object(16, false);
        let first = rt.read(addr, PrimitiveType::I32);
        let second = rt.read(addr, PrimitiveType::I32);
        assert_eq!(first, second, "second read must observe the fabricated, now-written value");
    }

    #[test]
    fn same_seed_is_deterministic() {
        let mut a = RuntimeState::with_region_capacity(42, "-", "t", 4096);
        let mut b = RuntimeState::with_region_capacity(42, "-", "t", 4096);
        let addr_a = a.allocate_object(16, false);
        let addr_b = b.allocate_object(16, false);
        assert_eq!(a.read(addr_a, PrimitiveType::I32), b.read(addr_b, PrimitiveType::I32));
    }

    #[test]
    fn out_of_bounds_write_is_silently_dropped() {
        let mut rt = RuntimeState::with_region_capacity(0, "-", "t", 4096);
        rt.write(1_000_000_000, Scalar::I32(1), false);
    }

    #[test]
    fn chains_a_fresh_region_when_the_current_one_is_exhausted() {
        let mut rt = RuntimeState::with_region_capacity(0, "-", "t", 64);
        let first = rt.allocate_object(48, false);
        let second = rt.allocate_object(48, false);
        assert!(second >= first + 48);
        assert_eq!(rt.regions().len(), 2);
    }
}
