//! Binary input-file format (SPEC_FULL.md §4.7 / §6).
//!
//! Field order: memory-size, memory, args-size, args, relocation-count,
//! relocations — every integer field little-endian. [`InputFile::from_runtime`]
//! walks a finished [`RuntimeState`]'s object list in address (== discovery)
//! order, trims each object to its used byte range, and assigns it a
//! contiguous file offset; a relocation then says "the 8 bytes at this file
//! offset are a pointer that, once reloaded, must point at this other file
//! offset" — one entry per pointer-map slot whose recorded target lands
//! inside a tracked object, plus one per argument whose bit pattern equals an
//! object's base.

use crate::error::{Error, Result};
use crate::runtime::RuntimeState;
use std::collections::HashMap;
use std::io::{self, Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationKind {
    /// `location` is a file offset into `memory`; the 8 bytes there must be
    /// rewritten to `target_offset`.
    Memory,
    /// `location` is an index into `args`; that argument's value must be
    /// rewritten to `target_offset`.
    Arg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    pub kind: RelocationKind,
    pub location: u64,
    pub target_offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputFile {
    pub memory: Vec<u8>,
    pub args: Vec<u64>,
    pub relocations: Vec<Relocation>,
}

impl InputFile {
    /// Builds the on-disk representation of one finished seed's runtime
    /// state. Mirrors the original runtime's `report()`: objects are walked
    /// in their natural (bump-allocation, hence address) order, each trimmed
    /// to `region.trim`'s used sub-range before being appended.
    #[must_use]
    pub fn from_runtime(state: &RuntimeState) -> Self {
        let regions = state.regions();
        let mut memory = Vec::new();
        let mut object_file_offset: HashMap<u64, u64> = HashMap::new();
        let mut pointer_slots: Vec<(u64, u64)> = Vec::new();

        for object in &state.objects {
            let region = regions
                .iter()
                .find(|r| r.contains_range(object.base, 1))
                .expect("every tracked object belongs to some tracked region");
            let (left, right) = region.trim(object.base, object.size);
            let file_offset = memory.len() as u64;
            object_file_offset.insert(object.base, file_offset);
            if right > left {
                memory.extend_from_slice(region.read_bytes(left, right - left));
                for addr in left..right {
                    if let Some(target) = region.pointer_at(addr) {
                        pointer_slots.push((file_offset + (addr - left), target));
                    }
                }
            }
        }

        let mut relocations = Vec::new();
        for (location, target) in pointer_slots {
            if let Some(&target_offset) = object_file_offset.get(&target) {
                relocations.push(Relocation {
                    kind: RelocationKind::Memory,
                    location,
                    target_offset,
                });
            }
        }
        for (index, &arg) in state.args.iter().enumerate() {
            if let Some(&target_offset) = object_file_offset.get(&arg) {
                relocations.push(Relocation {
                    kind: RelocationKind::Arg,
                    location: index as u64,
                    target_offset,
                });
            }
        }

        InputFile {
            memory,
            args: state.args.clone(),
            relocations,
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&(self.memory.len() as u64).to_le_bytes())?;
        w.write_all(&self.memory)?;
        w.write_all(&((self.args.len() * 8) as u64).to_le_bytes())?;
        for arg in &self.args {
            w.write_all(&arg.to_le_bytes())?;
        }
        w.write_all(&(self.relocations.len() as u64).to_le_bytes())?;
        for reloc in &self.relocations {
            let kind: u64 = match reloc.kind {
                RelocationKind::Memory => 0,
                RelocationKind::Arg => 1,
            };
            w.write_all(&kind.to_le_bytes())?;
            w.write_all(&reloc.location.to_le_bytes())?;
            w.write_all(&reloc.target_offset.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let memory_size = read_u64(r)?;
        let mut memory = vec![0u8; memory_size as usize];
        r.read_exact(&mut memory)?;

        let args_size = read_u64(r)?;
        if args_size % 8 != 0 {
            return Err(Error::InvalidInputFile("args-size is not a multiple of 8"));
        }
        let args = (0..args_size / 8).map(|_| read_u64(r)).collect::<Result<Vec<_>>>()?;

        let relocation_count = read_u64(r)?;
        let mut relocations = Vec::with_capacity(relocation_count as usize);
        for _ in 0..relocation_count {
            let kind = match read_u64(r)? {
                0 => RelocationKind::Memory,
                1 => RelocationKind::Arg,
                _ => return Err(Error::InvalidInputFile("unknown relocation kind")),
            };
            let location = read_u64(r)?;
            let target_offset = read_u64(r)?;
            relocations.push(Relocation {
                kind,
                location,
                target_offset,
            });
        }
        Ok(InputFile { memory, args, relocations })
    }

    /// Applies every relocation, rewriting pointer slots in `memory` and
    /// pointer-valued `args` to the absolute addresses `base + target_offset`
    /// resolves to once the file is loaded at `base`.
    pub fn relocate(&mut self, base: u64) {
        for reloc in &self.relocations {
            let absolute = base + reloc.target_offset;
            match reloc.kind {
                RelocationKind::Memory => {
                    let at = reloc.location as usize;
                    self.memory[at..at + 8].copy_from_slice(&absolute.to_le_bytes());
                }
                RelocationKind::Arg => {
                    self.args[reloc.location as usize] = absolute;
                }
            }
        }
    }
}

fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).map_err(io_to_error)?;
    Ok(u64::from_le_bytes(buf))
}

fn io_to_error(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::InvalidInputFile("truncated input file")
    } else {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::PrimitiveType;
    use crate::runtime::Scalar;

    #[test]
    fn roundtrips_through_bytes() {
        let mut state = RuntimeState::with_region_capacity(0, "-", "t", 4096);
        let a = state.allocate_object(16, false);
        state.write(a, Scalar::I32(7), false);
        state.fabricate_arg(PrimitiveType::I32);

        let file = InputFile::from_runtime(&state);
        let mut bytes = Vec::new();
        file.write_to(&mut bytes).unwrap();
        let reloaded = InputFile::read_from(&mut &bytes[..]).unwrap();
        assert_eq!(file, reloaded);
    }

    #[test]
    fn a_pointer_into_a_fabricated_object_becomes_a_memory_relocation() {
        let mut state = RuntimeState::with_region_capacity(7, "-", "t", 1 << 16);
        let outer = state.allocate_object(8, false);
        let inner = state.get_new_value(PrimitiveType::Ptr);
        state.write(outer, inner, true);

        let file = InputFile::from_runtime(&state);
        assert!(
            file.relocations.iter().any(|r| r.kind == RelocationKind::Memory),
            "the pointer written at `outer` must relocate to the fabricated object's offset"
        );
    }

    #[test]
    fn an_arg_whose_value_is_an_object_base_becomes_an_arg_relocation() {
        let mut state = RuntimeState::with_region_capacity(0, "-", "t", 4096);
        let ptr = state.fabricate_arg(PrimitiveType::Ptr);
        let file = InputFile::from_runtime(&state);
        if matches!(ptr, Scalar::Ptr(p) if p != 0) {
            assert!(file.relocations.iter().any(|r| r.kind == RelocationKind::Arg));
        }
    }

    #[test]
    fn relocate_rewrites_pointer_valued_args_to_the_loaded_base() {
        let mut state = RuntimeState::with_region_capacity(3, "-", "t", 4096);
        let mut ptr = state.fabricate_arg(PrimitiveType::Ptr);
        while matches!(ptr, Scalar::Ptr(0)) {
            state.args.clear();
            ptr = state.fabricate_arg(PrimitiveType::Ptr);
        }
        let mut file = InputFile::from_runtime(&state);
        file.relocate(0x1000);
        assert_eq!(file.args[0], 0x1000);
    }
}
