//! Loads the profiled ELF binary and extracts what the pipeline needs:
//! PIE-ness, executable load segments, the build id, and the raw symbol
//! table that feeds the symbol index.

use crate::domain::errors::BinaryError;
use crate::symbolization::symbol_index::RawSymbol;
use log::info;
use object::{
    Object, ObjectKind, ObjectSection, ObjectSegment, ObjectSymbol, SectionKind, SymbolKind,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Everything the pipeline reads out of the binary image.
#[derive(Debug)]
pub struct BinaryInfo {
    pub path: PathBuf,
    /// `ET_DYN` images need the per-process load address subtracted from
    /// sample addresses.
    pub is_pie: bool,
    /// Executable `PT_LOAD` segments, vaddr -> memsz. Empty for non-PIE
    /// binaries, which are never rebased.
    pub exec_segments: BTreeMap<u64, u64>,
    /// Raw `.note.gnu.build-id` payload, if the section exists.
    pub build_id: Option<Vec<u8>>,
    pub symbols: Vec<RawSymbol>,
}

/// Read and validate the binary at `path`.
///
/// # Errors
/// Fails on unreadable or non-ELF input, on a PIE image without an
/// executable load segment, and on executable segments that repeat a vaddr
/// with a different size.
pub fn load(path: &Path) -> Result<BinaryInfo, BinaryError> {
    let data = std::fs::read(path).map_err(|source| BinaryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if !matches!(
        object::FileKind::parse(&*data),
        Ok(object::FileKind::Elf32 | object::FileKind::Elf64)
    ) {
        return Err(BinaryError::NotElf {
            path: path.to_path_buf(),
        });
    }
    let file = object::File::parse(&*data).map_err(|source| BinaryError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let is_pie = file.kind() == ObjectKind::Dynamic;
    info!("'{}' is PIE binary: {}", path.display(), is_pie);

    let mut exec_segments = BTreeMap::new();
    if is_pie {
        exec_segments = exec_segment_map(file.segments().filter_map(|segment| {
            let object::SegmentFlags::Elf { p_flags } = segment.flags() else {
                return None;
            };
            (p_flags & object::elf::PF_X != 0).then(|| (segment.address(), segment.size()))
        }))?;
        if exec_segments.is_empty() {
            return Err(BinaryError::NoExecutableSegment {
                path: path.to_path_buf(),
            });
        }
        for (vaddr, memsz) in &exec_segments {
            info!("Loadable and executable segment: vaddr={vaddr:#x}, memsz={memsz:#x}");
        }
    }

    let build_id = file.build_id().ok().flatten().map(<[u8]>::to_vec);

    let mut symbols = Vec::new();
    for sym in file.symbols() {
        let Ok(name) = sym.name() else { continue };
        if name.is_empty() {
            continue;
        }
        let in_text = sym
            .section_index()
            .and_then(|index| file.section_by_index(index).ok())
            .map(|section| section.kind() == SectionKind::Text)
            .unwrap_or(false);
        symbols.push(RawSymbol {
            name: name.to_string(),
            addr: sym.address(),
            size: sym.size(),
            is_function: sym.kind() == SymbolKind::Text,
            in_text,
        });
    }

    Ok(BinaryInfo {
        path: path.to_path_buf(),
        is_pie,
        exec_segments,
        build_id,
        symbols,
    })
}

/// Collect `(vaddr, memsz)` pairs into the segment map, requiring repeated
/// vaddrs to agree on their size.
fn exec_segment_map<I>(segments: I) -> Result<BTreeMap<u64, u64>, BinaryError>
where
    I: IntoIterator<Item = (u64, u64)>,
{
    let mut map = BTreeMap::new();
    for (vaddr, memsz) in segments {
        match map.get(&vaddr) {
            Some(&existing) if existing != memsz => {
                return Err(BinaryError::SegmentSizeMismatch {
                    vaddr,
                    existing,
                    conflicting: memsz,
                });
            }
            Some(_) => {}
            None => {
                map.insert(vaddr, memsz);
            }
        }
    }
    Ok(map)
}
