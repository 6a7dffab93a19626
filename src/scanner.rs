//! Cartridge scanner and inflater (component D).
//!
//! Walks a cartridge image byte-by-byte looking for the `0x11 0x72` tag
//! that precedes a raw-DEFLATE-compressed model blob, inflates each
//! candidate, and keeps the ones whose decompressed bytes parse as a
//! model container. A bad tag match or a corrupt blob never aborts the
//! scan - it is simply skipped (§7, *ScanTolerant*).

use flate2::{Decompress, FlushDecompress, Status};

use crate::model::Model;

/// Compressed blobs larger than this are assumed to be false positives
/// and are skipped without attempting to inflate them (§4.4).
const MAX_COMPRESSED_SIZE: usize = 5 * 1024 * 1024;

/// A model found at a given byte offset in the cartridge image.
pub struct FoundModel {
    /// Offset of the `0x11` tag byte within the scanned image.
    pub offset: usize,
    /// The inflated container bytes, kept around so callers can persist
    /// them verbatim (`dump-models`'s `<offset>_model.bin` files).
    pub bytes: Vec<u8>,
    pub model: Model,
}

/// Scan `cartridge` for compressed model blobs and return every one that
/// inflates and parses successfully, in ascending offset order (§4.4).
///
/// The scan is forward-only and does not skip past a failed match - the
/// next iteration starts one byte after the current tag, so overlapping
/// tags are never missed.
pub fn find_models(cartridge: &[u8]) -> Vec<FoundModel> {
    let mut found = Vec::new();

    if cartridge.len() < 6 {
        return found;
    }

    for offset in 0..cartridge.len() - 1 {
        if cartridge[offset] != 0x11 || cartridge[offset + 1] != 0x72 {
            continue;
        }

        let Some(size) = read_be_u32(cartridge, offset + 2) else {
            continue;
        };
        let size = size as usize;
        if size > MAX_COMPRESSED_SIZE {
            continue;
        }

        let Some(compressed) = cartridge.get(offset + 6..offset + size) else {
            continue;
        };

        let Some(decompressed) = inflate_raw(compressed) else {
            continue;
        };

        if let Ok(model) = Model::parse(&decompressed) {
            found.push(FoundModel {
                offset,
                bytes: decompressed,
                model,
            });
        }
    }

    found
}

fn read_be_u32(data: &[u8], at: usize) -> Option<u32> {
    let slice = data.get(at..at + 4)?;
    Some(u32::from_be_bytes(slice.try_into().ok()?))
}

/// Inflate `compressed` as headerless (raw) DEFLATE, matching `zlib.decompress(data, wbits=-15)`.
fn inflate_raw(compressed: &[u8]) -> Option<Vec<u8>> {
    let mut decompressor = Decompress::new(false);
    let mut out = Vec::with_capacity(compressed.len() * 4);

    loop {
        let remaining = &compressed[decompressor.total_in() as usize..];
        let status = decompressor
            .decompress_vec(remaining, &mut out, FlushDecompress::Finish)
            .ok()?;

        match status {
            Status::StreamEnd => return Some(out),
            Status::Ok if remaining.is_empty() => return None,
            Status::Ok => {
                let grow = out.capacity().max(64 * 1024);
                out.reserve(grow);
            }
            Status::BufError => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn raw_deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn synthetic_model_bytes() -> Vec<u8> {
        // A minimal but parseable model: magic + four offsets pointing
        // past the fixed header, with zero textures/commands/vertices.
        let mut data = vec![0u8; 0x34];
        data[0..4].copy_from_slice(&0x0Bu32.to_be_bytes());
        data[4..8].copy_from_slice(&0u32.to_be_bytes()); // geometry_layout_offset
        data[8..10].copy_from_slice(&0x34u16.to_be_bytes()); // texture_setup_offset
        data[12..16].copy_from_slice(&0x34u32.to_be_bytes()); // display_list_setup_offset
        data[16..20].copy_from_slice(&0x34u32.to_be_bytes()); // vertex_store_setup_offset
        // texture setup header at 0x34: data_length=0, texture_count=0
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        // display list at the same offset: command_count=0
        data.extend_from_slice(&0u32.to_be_bytes());
        // vertex store: the parser seeks to absolute 0x16/0x18 within this
        // slice, so pad enough that a zero vertex_count reads as zero.
        while data.len() < 0x34 + 0x18 + 2 {
            data.push(0);
        }
        data
    }

    #[test]
    fn finds_and_inflates_a_tagged_model() {
        let model_bytes = synthetic_model_bytes();
        let compressed = raw_deflate(&model_bytes);

        let mut cartridge = vec![0u8; 16];
        cartridge.push(0x11);
        cartridge.push(0x72);
        cartridge.extend_from_slice(&((compressed.len() + 6) as u32).to_be_bytes());
        cartridge.extend_from_slice(&compressed);
        cartridge.extend_from_slice(&[0u8; 8]);

        let found = find_models(&cartridge);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].offset, 16);
        assert_eq!(found[0].model.texture_setup.texture_count, 0);
    }

    #[test]
    fn skips_oversized_and_garbage_tags_without_aborting() {
        let mut cartridge = vec![0x11, 0x72];
        cartridge.extend_from_slice(&(10 * 1024 * 1024u32).to_be_bytes()); // oversized
        cartridge.extend_from_slice(&[0u8; 8]);
        cartridge.push(0x11);
        cartridge.push(0x72);
        cartridge.extend_from_slice(&20u32.to_be_bytes());
        cartridge.extend_from_slice(&[0xFFu8; 14]); // not valid deflate

        assert!(find_models(&cartridge).is_empty());
    }

    #[test]
    fn empty_and_tiny_buffers_return_no_models() {
        assert!(find_models(&[]).is_empty());
        assert!(find_models(&[0x11, 0x72, 0, 0]).is_empty());
    }
}
