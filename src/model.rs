//! Model container parser (component C).
//!
//! Decodes the fixed-offset header, texture table, display-list program,
//! and vertex store out of an already-inflated container (see
//! [`crate::scanner`] for how one of these buffers is found and inflated in
//! the first place). Parsing is pure: no I/O, no global state, and the
//! buffer is consumed by value into an immutable [`Model`].

use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::texture::TextureType;
use crate::utils::{be_i16, be_u16, be_u32, bytesa, bytesv, u8};
use crate::{Error, Result};

/// Minimum container length: the fixed header alone runs through offset
/// 0x34 (tri_count/vert_count end at 0x34, for 52 bytes total).
///
/// §3's prose describes "0x20..0x30: five further u32s" plus a separate
/// unused u16 before tri_count/vert_count; that would make the header 58
/// bytes, which both overruns S1's declared 52-byte fixture and disagrees
/// with the layout actually walked by the source this was reverse
/// engineered from. Resolved in favor of the internally-consistent,
/// 52-byte reading: four unused u32s at 0x20..0x30, then tri_count and
/// vert_count directly (no extra unused u16). See DESIGN.md.
const HEADER_LEN: usize = 0x34;

/// Container magic word at offset 0x00.
const MAGIC: u32 = 0x0000000B;

/// Fixed-offset model header (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelHeader {
    pub geometry_layout_offset: u32,
    pub texture_setup_offset: u16,
    pub geometry_type: u16,
    pub display_list_setup_offset: u32,
    pub vertex_store_setup_offset: u32,
    pub animation_setup_offset: u32,
    pub collision_setup_offset: u32,
    /// Authoritative triangle count, taken verbatim from offset 0x30.
    pub tri_count: u16,
    /// Authoritative vertex count, taken verbatim from offset 0x32.
    pub vert_count: u16,
}

impl ModelHeader {
    fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let magic = be_u32(r)?;
        if magic != MAGIC {
            return Err(Error::InvalidMagic(magic));
        }

        let geometry_layout_offset = be_u32(r)?;
        let texture_setup_offset = be_u16(r)?;
        let geometry_type = be_u16(r)?;
        let display_list_setup_offset = be_u32(r)?;
        let vertex_store_setup_offset = be_u32(r)?;
        let _unused_1 = be_u32(r)?;
        let animation_setup_offset = be_u32(r)?;
        let collision_setup_offset = be_u32(r)?;
        for _ in 0..4 {
            be_u32(r)?; // effects_end_address, effects_offset, unused_2, unused_3 (0x20..0x30)
        }
        let tri_count = be_u16(r)?; // 0x30
        let vert_count = be_u16(r)?; // 0x32

        Ok(Self {
            geometry_layout_offset,
            texture_setup_offset,
            geometry_type,
            display_list_setup_offset,
            vertex_store_setup_offset,
            animation_setup_offset,
            collision_setup_offset,
            tri_count,
            vert_count,
        })
    }
}

/// One entry of the texture table (§3).
#[derive(Debug, Clone, Copy)]
pub struct TextureSubHeader {
    /// Offset relative to the start of the texture data region (§4.3).
    pub segment_offset: u32,
    /// `None` when the raw type field does not match a modeled format
    /// (§7, *UnknownTextureType*) - the texture is kept with empty pixel
    /// data rather than aborting the parse.
    pub texture_type: Option<TextureType>,
    pub width: u8,
    pub height: u8,
}

impl TextureSubHeader {
    fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let segment_offset = be_u32(r)?;
        let raw_type = be_u16(r)?;
        let _padding = be_u16(r)?;
        let width = u8(r)?;
        let height = u8(r)?;
        let _padding2 = bytesv(r, 6)?;

        Ok(Self {
            segment_offset,
            texture_type: TextureType::from_raw(raw_type),
            width,
            height,
        })
    }

    fn data_length(&self) -> usize {
        match self.texture_type {
            Some(ty) => ty.data_length(self.width, self.height),
            None => 0,
        }
    }
}

/// A texture's pixel data, sliced out of the container at parse time.
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u8,
    pub height: u8,
    pub texture_type: Option<TextureType>,
    pub data: Vec<u8>,
}

/// Parsed texture table: header fields plus every subheader, sorted
/// nondecreasingly by `segment_offset` (§4.3 invariant 2).
#[derive(Debug, Clone)]
pub struct TextureSetupHeader {
    pub data_length: u32,
    pub texture_count: u16,
    pub sub_headers: Vec<TextureSubHeader>,
}

impl TextureSetupHeader {
    fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let data_length = be_u32(r)?;
        let texture_count = be_u16(r)?;

        let mut sub_headers = Vec::with_capacity(texture_count as usize);
        for _ in 0..texture_count {
            sub_headers.push(TextureSubHeader::parse(r)?);
        }
        sub_headers.sort_by_key(|h| h.segment_offset);

        Ok(Self {
            data_length,
            texture_count,
            sub_headers,
        })
    }

    /// Return the largest index `i` whose `segment_offset <= address`, or
    /// `None` if `address` precedes every entry (§4.2).
    pub fn find_nearest_texture(&self, address: u32) -> Option<usize> {
        match self
            .sub_headers
            .partition_point(|h| h.segment_offset <= address)
        {
            0 => None,
            n => Some(n - 1),
        }
    }
}

/// A parsed vertex (§3). UVs are already scaled from their Q-format fixed
/// point representation (divide by 4096, not the hardware-documented shift
/// of 6 - see §3's note on the empirically correct scale for this title).
#[derive(Debug, Clone, Copy)]
pub struct Vertex {
    pub position: (i16, i16, i16),
    pub flag: u16,
    pub uv: (f32, f32),
    pub color: (u8, u8, u8),
    pub alpha: u8,
}

impl Vertex {
    fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let x = be_i16(r)?;
        let y = be_i16(r)?;
        let z = be_i16(r)?;
        let flag = be_u16(r)?;
        let u = be_i16(r)?;
        let v = be_i16(r)?;
        let red = u8(r)?;
        let green = u8(r)?;
        let blue = u8(r)?;
        let alpha = u8(r)?;

        Ok(Self {
            position: (x, y, z),
            flag,
            uv: (u as f32 / 4096.0, v as f32 / 4096.0),
            color: (red, green, blue),
            alpha,
        })
    }
}

/// A decoded display-list command (§4.5, §9's tagged-variant recommendation).
#[derive(Debug, Clone, Copy)]
pub enum Command {
    /// `G_VTX` (0x04): load vertices into the vertex-index cache.
    Vtx {
        write_start: u8,
        verts_to_write: u8,
        load_address: u32,
    },
    /// `G_TRI1` (0xBF): one indexed triangle, slots into the vertex cache.
    Tri1 { v1: u8, v2: u8, v3: u8 },
    /// `G_TRI2` (0xB1): two indexed triangles packed into one command word.
    Tri2 {
        v1: u8,
        v2: u8,
        v3: u8,
        v4: u8,
        v5: u8,
        v6: u8,
    },
    /// `G_TEXTURE` (0xBB): set the per-axis UV scale applied to newly
    /// touched vertices.
    Texture { scale_s: f32, scale_t: f32 },
    /// `G_SETTIMG` (0xFD): select the texture used by subsequent triangles.
    SetTImg { segment_address: u32 },
    /// Any opcode not in the recognized subset - a deliberate no-op (§4.3).
    Other,
}

/// The display-list program: a flat sequence of decoded commands (§3).
#[derive(Debug, Clone)]
pub struct DisplayList {
    pub commands: Vec<Command>,
}

impl DisplayList {
    fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let command_count = be_u32(r)?;
        // 4 bytes of padding separate `command_count` from the first
        // command word, which starts at container offset 8, not 4.
        let _padding: [u8; 4] = bytesa(r)?;
        let mut commands = Vec::with_capacity(command_count as usize);

        for _ in 0..command_count {
            let word: [u8; 8] = bytesa(r)?;
            commands.push(decode_command(&word));
        }

        Ok(Self { commands })
    }
}

fn decode_command(cmd: &[u8]) -> Command {
    match cmd[0] {
        0x04 => {
            let write_start = cmd[1];
            let vert_len = u16::from_be_bytes([cmd[2], cmd[3]]);
            let load_address = u32::from_be_bytes([cmd[4], cmd[5], cmd[6], cmd[7]]);
            Command::Vtx {
                write_start,
                verts_to_write: (vert_len >> 10) as u8,
                load_address,
            }
        }
        0xBF => Command::Tri1 {
            v1: cmd[5] / 2,
            v2: cmd[6] / 2,
            v3: cmd[7] / 2,
        },
        0xB1 => Command::Tri2 {
            v1: cmd[1] / 2,
            v2: cmd[2] / 2,
            v3: cmd[3] / 2,
            v4: cmd[5] / 2,
            v5: cmd[6] / 2,
            v6: cmd[7] / 2,
        },
        0xBB => {
            let s = u16::from_be_bytes([cmd[4], cmd[5]]);
            let t = u16::from_be_bytes([cmd[6], cmd[7]]);
            Command::Texture {
                scale_s: s as f32 / 65536.0,
                scale_t: t as f32 / 65536.0,
            }
        }
        0xFD => {
            let segment_address = u32::from_be_bytes([cmd[4], cmd[5], cmd[6], cmd[7]]);
            Command::SetTImg { segment_address }
        }
        _ => Command::Other,
    }
}

/// The vertex store: every parsed vertex record (§3).
///
/// The "doubled" field name in the source is a historical artifact - the
/// count it stores is in fact the real, unhalved vertex count, and the
/// interpreter's `load_address / 16` arithmetic indexes directly into this
/// array (§9, open question).
#[derive(Debug, Clone)]
pub struct VertexStore {
    pub vertices: Vec<Vertex>,
}

impl VertexStore {
    fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        r.seek(SeekFrom::Start(0x16))
            .map_err(|_| Error::TruncatedInput)?;
        let vertex_count = be_u16(r)?;

        r.seek(SeekFrom::Start(0x18))
            .map_err(|_| Error::TruncatedInput)?;
        let mut vertices = Vec::with_capacity(vertex_count as usize);
        for _ in 0..vertex_count {
            vertices.push(Vertex::parse(r)?);
        }

        Ok(Self { vertices })
    }
}

/// A fully parsed, immutable model container (§3).
#[derive(Debug, Clone)]
pub struct Model {
    pub header: ModelHeader,
    pub texture_setup: TextureSetupHeader,
    pub textures: Vec<TextureData>,
    pub display_list: DisplayList,
    pub vertex_store: VertexStore,
}

impl Model {
    /// Parse a model container from its fully inflated bytes (§4.3).
    ///
    /// # Errors
    /// [`Error::InvalidMagic`] if the leading magic word isn't `0x0B`.
    /// [`Error::TruncatedInput`] if the buffer is too short for any
    /// fixed-offset read. [`Error::TruncatedTexture`] if a texture's pixel
    /// data slice would run past the end of the buffer.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::TruncatedInput);
        }

        let mut cursor = Cursor::new(data);
        let header = ModelHeader::parse(&mut cursor)?;

        let texture_setup_offset = header.texture_setup_offset as usize;
        let mut texture_cursor = data
            .get(texture_setup_offset..)
            .ok_or(Error::TruncatedInput)
            .map(Cursor::new)?;
        let texture_setup = TextureSetupHeader::parse(&mut texture_cursor)?;

        let mut textures = Vec::with_capacity(texture_setup.sub_headers.len());
        let table_base =
            texture_setup_offset + 8 + texture_setup.sub_headers.len() * 16;
        for sub in &texture_setup.sub_headers {
            let start = table_base + sub.segment_offset as usize;
            let len = sub.data_length();
            let end = start
                .checked_add(len)
                .filter(|&end| end <= data.len())
                .ok_or(Error::TruncatedTexture)?;

            textures.push(TextureData {
                width: sub.width,
                height: sub.height,
                texture_type: sub.texture_type,
                data: data[start..end].to_vec(),
            });
        }

        let mut dl_cursor = data
            .get(header.display_list_setup_offset as usize..)
            .ok_or(Error::TruncatedInput)
            .map(Cursor::new)?;
        let display_list = DisplayList::parse(&mut dl_cursor)?;

        let vs_start = header.vertex_store_setup_offset as usize;
        let vs_slice = data.get(vs_start..).ok_or(Error::TruncatedInput)?;
        let mut vs_cursor = Cursor::new(vs_slice);
        let vertex_store = VertexStore::parse(&mut vs_cursor)?;

        Ok(Self {
            header,
            texture_setup,
            textures,
            display_list,
            vertex_store,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a 52-byte header matching S1: magic, geometry_layout,
    /// texture_setup (u16) + geometry_type (u16), display_list,
    /// vertex_store, four unused/effects u32s, tri_count, vert_count.
    fn synthetic_header(
        geometry_layout: u32,
        texture_setup: u16,
        display_list: u32,
        vertex_store: u32,
        tri_count: u16,
        vert_count: u16,
    ) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&MAGIC.to_be_bytes());
        data.extend_from_slice(&geometry_layout.to_be_bytes());
        data.extend_from_slice(&texture_setup.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes()); // geometry_type
        data.extend_from_slice(&display_list.to_be_bytes());
        data.extend_from_slice(&vertex_store.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes()); // unused_1
        data.extend_from_slice(&104u32.to_be_bytes()); // animation_setup_offset
        data.extend_from_slice(&105u32.to_be_bytes()); // collision_setup_offset
        for _ in 0..4 {
            data.extend_from_slice(&0u32.to_be_bytes());
        }
        data.extend_from_slice(&tri_count.to_be_bytes());
        data.extend_from_slice(&vert_count.to_be_bytes());
        data
    }

    #[test]
    fn parses_synthetic_header() {
        let data = synthetic_header(100, 101, 102, 103, 900, 45);
        assert_eq!(data.len(), HEADER_LEN);

        let header = ModelHeader::parse(&mut Cursor::new(&data[..])).unwrap();
        assert_eq!(header.geometry_layout_offset, 100);
        assert_eq!(header.texture_setup_offset, 101);
        assert_eq!(header.display_list_setup_offset, 102);
        assert_eq!(header.vertex_store_setup_offset, 103);
        assert_eq!(header.tri_count, 900);
        assert_eq!(header.vert_count, 45);
    }

    #[test]
    fn rejects_bad_magic() {
        let data = [0xFFu8; HEADER_LEN];
        let err = ModelHeader::parse(&mut Cursor::new(&data[..])).unwrap_err();
        assert!(matches!(err, Error::InvalidMagic(_)));
    }

    fn sub_header(segment_offset: u32) -> TextureSubHeader {
        TextureSubHeader {
            segment_offset,
            texture_type: TextureType::from_raw(4),
            width: 32,
            height: 32,
        }
    }

    #[test]
    fn find_nearest_texture_matches_scenario_s2() {
        let setup = TextureSetupHeader {
            data_length: 0,
            texture_count: 3,
            sub_headers: vec![sub_header(0x00), sub_header(0x80), sub_header(0xD0)],
        };

        assert_eq!(setup.find_nearest_texture(0x00), Some(0));
        assert_eq!(setup.find_nearest_texture(0x10), Some(0));
        assert_eq!(setup.find_nearest_texture(0x40), Some(0));
        assert_eq!(setup.find_nearest_texture(0x80), Some(1));
        assert_eq!(setup.find_nearest_texture(0xA0), Some(1));
        assert_eq!(setup.find_nearest_texture(0xD0), Some(2));
        assert_eq!(setup.find_nearest_texture(0xD2), Some(2));
    }

    #[test]
    fn find_nearest_texture_none_before_first_entry() {
        let setup = TextureSetupHeader {
            data_length: 0,
            texture_count: 1,
            sub_headers: vec![sub_header(0x10)],
        };
        assert_eq!(setup.find_nearest_texture(0x00), None);
    }
}
