//! Symbol-side half of the pipeline: loading the binary, decoding the
//! basic-block naming convention, indexing symbols by address, and
//! translating runtime sample addresses back into the link-time image.

pub mod bb_name;
pub mod binary;
pub mod memory_map;
pub mod symbol_index;

pub use binary::BinaryInfo;
pub use memory_map::{AddressTranslator, MmapEntry, MmapRegistry};
pub use symbol_index::{RawSymbol, Symbol, SymbolIndex};
