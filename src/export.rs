//! Mesh/texture export adapter (component F).
//!
//! Packs a parsed [`Model`] and its [`Simulation`] into the neutral,
//! glTF-shaped byte buffers and accessor descriptors described in §4.6.
//! This module makes no algorithmic decisions of its own - it is a
//! faithful shape translation - and has no dependency on any particular
//! glTF or PNG crate. A CLI binary built against this library (the "F"
//! consumer named in §1's external collaborators) is the place that
//! depends on `gltf-json`/`image` and turns this shape into actual files.

use crate::interpreter::Simulation;
use crate::model::Model;
use crate::texture::{self, Rgba};
use crate::Result;

/// Byte stride of one packed vertex record (§4.6): 3 `f32` position + 4
/// `u8` color (3 channels + 1 pad byte) + 2 `f32` uv = 12 + 4 + 8 = 24.
pub const VERTEX_STRIDE: usize = 24;

/// Min/max bounds accumulated while packing one accessor.
#[derive(Debug, Clone, Copy)]
pub struct MinMax<T> {
    pub min: T,
    pub max: T,
}

impl<T: Copy + PartialOrd> MinMax<T> {
    fn new(first: T) -> Self {
        Self {
            min: first,
            max: first,
        }
    }

    fn update(&mut self, value: T) {
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }
}

fn update3(tracker: &mut Option<MinMax<[f32; 3]>>, v: [f32; 3]) {
    match tracker {
        None => *tracker = Some(MinMax::new(v)),
        Some(mm) => {
            for (i, &x) in v.iter().enumerate() {
                if x < mm.min[i] {
                    mm.min[i] = x;
                }
                if x > mm.max[i] {
                    mm.max[i] = x;
                }
            }
        }
    }
}

fn update2(tracker: &mut Option<MinMax<[f32; 2]>>, v: [f32; 2]) {
    match tracker {
        None => *tracker = Some(MinMax::new(v)),
        Some(mm) => {
            for (i, &x) in v.iter().enumerate() {
                if x < mm.min[i] {
                    mm.min[i] = x;
                }
                if x > mm.max[i] {
                    mm.max[i] = x;
                }
            }
        }
    }
}

/// One mesh's slice of the shared index buffer.
#[derive(Debug, Clone, Copy)]
pub struct MeshIndexRange {
    /// Byte offset into [`PackedAsset::index_buffer`].
    pub byte_offset: usize,
    /// Number of `u16` indices (3x the triangle count).
    pub count: usize,
    pub bounds: MinMax<u16>,
    /// Texture table index this mesh references, if any (§3).
    pub texture_index: Option<usize>,
}

/// A decoded texture, ready to be PNG-encoded by a caller.
#[derive(Debug, Clone)]
pub struct TextureImage {
    pub width: u8,
    pub height: u8,
    /// Row-major, row 0 = top (§6: the reference implementation's flipped
    /// pathway is not reproduced - callers get unflipped output uniformly).
    pub pixels: Vec<Rgba>,
}

/// The neutral, glTF-shaped packed asset produced by [`pack`].
#[derive(Debug, Clone)]
pub struct PackedAsset {
    /// Concatenation of every mesh's index buffer, each a run of `u16`
    /// triples, padded as a whole to a 4-byte boundary.
    pub index_buffer: Vec<u8>,
    /// Shared vertex buffer, stride [`VERTEX_STRIDE`], padded to a 4-byte
    /// boundary.
    pub vertex_buffer: Vec<u8>,
    pub meshes: Vec<MeshIndexRange>,
    pub vertex_count: usize,
    pub position_bounds: Option<MinMax<[f32; 3]>>,
    pub color_bounds: Option<MinMax<[f32; 3]>>,
    pub uv_bounds: Option<MinMax<[f32; 2]>>,
    /// Decoded textures, in the same order as the model's (sorted) texture
    /// table; a [`Mesh::texture_index`](crate::interpreter::Mesh::texture_index)
    /// indexes into this.
    pub textures: Vec<TextureImage>,
}

fn pad_to_4(buf: &mut Vec<u8>) {
    while !buf.len().is_multiple_of(4) {
        buf.push(0);
    }
}

/// Pack `model` and its already-simulated display list into the neutral
/// export shape (§4.6).
///
/// # Errors
/// Propagates texture decode failures from [`texture::decode`] (truncated
/// pixel data); an unmodeled texture type never reaches decoding and is
/// represented as an empty image instead (§7, *UnknownTextureType*).
pub fn pack(model: &Model, sim: &Simulation) -> Result<PackedAsset> {
    let mut vertex_buffer = Vec::with_capacity(model.vertex_store.vertices.len() * VERTEX_STRIDE);
    let mut position_bounds = None;
    let mut color_bounds = None;
    let mut uv_bounds = None;

    for (i, vertex) in model.vertex_store.vertices.iter().enumerate() {
        let position = [
            vertex.position.0 as f32 / 128.0,
            vertex.position.1 as f32 / 128.0,
            vertex.position.2 as f32 / 128.0,
        ];
        let color = [
            vertex.color.0 as f32,
            vertex.color.1 as f32,
            vertex.color.2 as f32,
        ];
        let uv = sim
            .uv_overrides
            .get(&(i as u16))
            .copied()
            .unwrap_or(vertex.uv);

        update3(&mut position_bounds, position);
        update3(&mut color_bounds, color);
        update2(&mut uv_bounds, [uv.0, uv.1]);

        vertex_buffer.extend_from_slice(&position[0].to_le_bytes());
        vertex_buffer.extend_from_slice(&position[1].to_le_bytes());
        vertex_buffer.extend_from_slice(&position[2].to_le_bytes());
        vertex_buffer.push(vertex.color.0);
        vertex_buffer.push(vertex.color.1);
        vertex_buffer.push(vertex.color.2);
        vertex_buffer.push(0); // pad byte
        vertex_buffer.extend_from_slice(&uv.0.to_le_bytes());
        vertex_buffer.extend_from_slice(&uv.1.to_le_bytes());
    }

    let mut index_buffer = Vec::new();
    let mut meshes = Vec::with_capacity(sim.meshes.len());
    for mesh in &sim.meshes {
        let byte_offset = index_buffer.len();
        let mut bounds: Option<MinMax<u16>> = None;
        for &(a, b, c) in &mesh.indices {
            for idx in [a, b, c] {
                index_buffer.extend_from_slice(&idx.to_le_bytes());
                match &mut bounds {
                    None => bounds = Some(MinMax::new(idx)),
                    Some(mm) => mm.update(idx),
                }
            }
        }
        meshes.push(MeshIndexRange {
            byte_offset,
            count: mesh.indices.len() * 3,
            bounds: bounds.unwrap_or(MinMax { min: 0, max: 0 }),
            texture_index: mesh.texture_index,
        });
    }

    pad_to_4(&mut index_buffer);
    pad_to_4(&mut vertex_buffer);

    let mut textures = Vec::with_capacity(model.textures.len());
    for tex in &model.textures {
        let pixels = match tex.texture_type {
            Some(ty) => texture::decode(ty, &tex.data, tex.width, tex.height)?,
            None => Vec::new(),
        };
        textures.push(TextureImage {
            width: tex.width,
            height: tex.height,
            pixels,
        });
    }

    Ok(PackedAsset {
        index_buffer,
        vertex_buffer,
        meshes,
        vertex_count: model.vertex_store.vertices.len(),
        position_bounds,
        color_bounds,
        uv_bounds,
        textures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Mesh;
    use crate::model::{DisplayList, ModelHeader, TextureSetupHeader, Vertex, VertexStore};
    use std::collections::HashMap;

    fn minimal_model(vertices: Vec<Vertex>) -> Model {
        Model {
            header: ModelHeader {
                geometry_layout_offset: 0,
                texture_setup_offset: 0,
                geometry_type: 0,
                display_list_setup_offset: 0,
                vertex_store_setup_offset: 0,
                animation_setup_offset: 0,
                collision_setup_offset: 0,
                tri_count: 0,
                vert_count: vertices.len() as u16,
            },
            texture_setup: TextureSetupHeader {
                data_length: 0,
                texture_count: 0,
                sub_headers: Vec::new(),
            },
            textures: Vec::new(),
            display_list: DisplayList { commands: Vec::new() },
            vertex_store: VertexStore { vertices },
        }
    }

    #[test]
    fn packs_vertex_buffer_with_correct_stride() {
        let vertices = vec![
            Vertex {
                position: (128, 256, -128),
                flag: 0,
                uv: (1.0, 2.0),
                color: (10, 20, 30),
                alpha: 255,
            },
            Vertex {
                position: (0, 0, 0),
                flag: 0,
                uv: (0.0, 0.0),
                color: (1, 2, 3),
                alpha: 255,
            },
        ];
        let model = minimal_model(vertices);
        let sim = Simulation {
            meshes: vec![Mesh {
                texture_index: None,
                scale_s: 1.0,
                scale_t: 1.0,
                indices: vec![(0, 1, 0)],
            }],
            uv_overrides: HashMap::new(),
        };

        let packed = pack(&model, &sim).unwrap();
        assert_eq!(packed.vertex_buffer.len() % 4, 0);
        assert!(packed.vertex_buffer.len() >= 2 * VERTEX_STRIDE);
        assert_eq!(packed.meshes.len(), 1);
        assert_eq!(packed.meshes[0].count, 3);
        assert_eq!(packed.meshes[0].bounds.min, 0);
        assert_eq!(packed.meshes[0].bounds.max, 1);

        let x = f32::from_le_bytes(packed.vertex_buffer[0..4].try_into().unwrap());
        assert_eq!(x, 1.0); // 128 / 128
    }

    #[test]
    fn uv_override_wins_over_raw_vertex_uv() {
        let vertices = vec![Vertex {
            position: (0, 0, 0),
            flag: 0,
            uv: (9.0, 9.0),
            color: (0, 0, 0),
            alpha: 0,
        }];
        let model = minimal_model(vertices);
        let mut overrides = HashMap::new();
        overrides.insert(0u16, (0.5, 0.25));
        let sim = Simulation {
            meshes: Vec::new(),
            uv_overrides: overrides,
        };

        let packed = pack(&model, &sim).unwrap();
        let uv_s = f32::from_le_bytes(packed.vertex_buffer[16..20].try_into().unwrap());
        let uv_t = f32::from_le_bytes(packed.vertex_buffer[20..24].try_into().unwrap());
        assert_eq!((uv_s, uv_t), (0.5, 0.25));
    }
}
