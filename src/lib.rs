//! **bk64model** - extracts 3D model assets (geometry, UVs, textures) from a
//! N64-era graphics-microcode cartridge image.
//!
//! # Pipeline
//! | Module | Role |
//! |--------|------|
//! | [`bitreader`]   | MSB-first sub-byte reads for packed pixel/palette data |
//! | [`texture`]     | CI4/CI8/RGBA16/RGBA32/IA8 decoders |
//! | [`model`]       | Fixed-offset container parser: header, textures, display list, vertices |
//! | [`scanner`]     | Cartridge-wide scan for compressed model blobs and raw-DEFLATE inflation |
//! | [`interpreter`] | Display-list simulation: vertex cache, per-texture mesh splitting, UV scaling |
//! | [`export`]      | Neutral glTF-shaped buffer/accessor packing |
//!
//! The teacher's unrelated Nintendo-archive/crypto modules that this crate
//! was built out of are intentionally absent here; see `DESIGN.md` for what
//! was kept, generalized, or dropped.

pub mod bitreader;
pub mod error;
pub mod export;
pub mod interpreter;
pub mod model;
pub mod scanner;
pub mod texture;
pub mod utils;

pub use error::{Error, Result};
