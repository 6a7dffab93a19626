//! Display-list interpreter (component E).
//!
//! Simulates the subset of graphics-microcode commands needed to recover
//! geometry: a 64-slot vertex-index cache, a running per-axis UV scale,
//! and per-texture mesh splitting. The interpreter never fails - a
//! malformed or partial display list simply yields fewer/emptier meshes
//! (§7, *InterpreterWarn* is non-fatal by construction).

use std::collections::HashMap;

use crate::model::{Command, Model, Vertex};

/// Size of the on-chip vertex-index cache (§3, §4.5).
const VERTEX_CACHE_SLOTS: usize = 64;

/// Segment 0x02 is the model's own texture region (§4.5, GLOSSARY).
const TEXTURE_SEGMENT_BASE: u32 = 0x0200_0000;

/// One reconstructed, per-material mesh (§3).
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Index into the model's sorted texture table, if a texture was ever
    /// selected before this mesh's triangles. `None` when the display list
    /// never issued a `G_SETTIMG` that matched a table entry.
    pub texture_index: Option<usize>,
    pub scale_s: f32,
    pub scale_t: f32,
    /// Triangles as `(v1, v2, v3)` indices into the model's vertex store.
    pub indices: Vec<(u16, u16, u16)>,
}

impl Mesh {
    fn fresh(texture_index: Option<usize>) -> Self {
        Self {
            texture_index,
            scale_s: 1.0,
            scale_t: 1.0,
            indices: Vec::new(),
        }
    }
}

/// Per-vertex UV override produced by simulation (§9's immutable-model
/// re-architecture): `vertex_index -> (s, t)`, populated the first time a
/// vertex is referenced by a triangle. The exporter should prefer this
/// over the model's raw UV when an entry is present.
pub type UvOverrides = HashMap<u16, (f32, f32)>;

/// Result of simulating a model's display list.
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    pub meshes: Vec<Mesh>,
    pub uv_overrides: UvOverrides,
}

/// Simulate `model`'s display list, producing per-material meshes and a UV
/// override table (§4.5).
pub fn simulate(model: &Model) -> Simulation {
    let mut vertex_index_buffer = [0u16; VERTEX_CACHE_SLOTS];
    let mut touched: std::collections::HashSet<u16> = std::collections::HashSet::new();
    let mut uv_overrides = UvOverrides::new();
    let mut meshes = Vec::new();
    let mut current = Mesh::fresh(None);
    // G_TEXTURE sets a scale register that persists independently of which
    // texture is bound; it must survive a G_SETTIMG-triggered mesh split.
    let (mut scale_s, mut scale_t) = (1.0f32, 1.0f32);

    for command in &model.display_list.commands {
        match *command {
            Command::Vtx {
                write_start,
                verts_to_write,
                load_address,
            } => {
                let index_offset = (load_address & 0x00FF_FFFF) / 16;
                for i in 0..verts_to_write as usize {
                    let slot = write_start as usize + i;
                    if slot < VERTEX_CACHE_SLOTS {
                        vertex_index_buffer[slot] = (index_offset + i as u32) as u16;
                    }
                }
            }
            Command::Tri1 { v1, v2, v3 } => {
                let tri = resolve_triangle(&vertex_index_buffer, [v1, v2, v3]);
                let vertices = &model.vertex_store.vertices;
                scale_vertex_uv(tri.0, current.scale_s, current.scale_t, vertices, &mut touched, &mut uv_overrides);
                scale_vertex_uv(tri.1, current.scale_s, current.scale_t, vertices, &mut touched, &mut uv_overrides);
                scale_vertex_uv(tri.2, current.scale_s, current.scale_t, vertices, &mut touched, &mut uv_overrides);
                current.indices.push(tri);
            }
            Command::Tri2 {
                v1,
                v2,
                v3,
                v4,
                v5,
                v6,
            } => {
                let vertices = &model.vertex_store.vertices;
                for slots in [[v1, v2, v3], [v4, v5, v6]] {
                    let tri = resolve_triangle(&vertex_index_buffer, slots);
                    scale_vertex_uv(tri.0, current.scale_s, current.scale_t, vertices, &mut touched, &mut uv_overrides);
                    scale_vertex_uv(tri.1, current.scale_s, current.scale_t, vertices, &mut touched, &mut uv_overrides);
                    scale_vertex_uv(tri.2, current.scale_s, current.scale_t, vertices, &mut touched, &mut uv_overrides);
                    current.indices.push(tri);
                }
            }
            Command::Texture {
                scale_s: s,
                scale_t: t,
            } => {
                scale_s = s;
                scale_t = t;
                current.scale_s = s;
                current.scale_t = t;
            }
            Command::SetTImg { segment_address } => {
                let texture_offset = segment_address.wrapping_sub(TEXTURE_SEGMENT_BASE);
                let next_index = model.texture_setup.find_nearest_texture(texture_offset);

                if next_index != current.texture_index {
                    if !current.indices.is_empty() {
                        meshes.push(current);
                    }
                    current = Mesh::fresh(next_index);
                    current.scale_s = scale_s;
                    current.scale_t = scale_t;
                }
            }
            Command::Other => {}
        }
    }

    if !current.indices.is_empty() {
        meshes.push(current);
    }

    Simulation {
        meshes,
        uv_overrides,
    }
}

fn resolve_triangle(buffer: &[u16; VERTEX_CACHE_SLOTS], slots: [u8; 3]) -> (u16, u16, u16) {
    let get = |slot: u8| buffer.get(slot as usize).copied().unwrap_or(0);
    (get(slots[0]), get(slots[1]), get(slots[2]))
}

/// Scale `vertex_index`'s UV by the scale in force at its *first*
/// reference only (§4.5's once-only rule): `overrides[vertex_index] =
/// raw_uv * scale`, matching the semantics of the in-place
/// `vertex[gi].uv *= scale` mutation this side table replaces.
fn scale_vertex_uv(
    vertex_index: u16,
    scale_s: f32,
    scale_t: f32,
    vertices: &[Vertex],
    touched: &mut std::collections::HashSet<u16>,
    overrides: &mut UvOverrides,
) {
    if touched.insert(vertex_index) {
        let raw_uv = vertices
            .get(vertex_index as usize)
            .map(|v| v.uv)
            .unwrap_or((0.0, 0.0));
        overrides.insert(vertex_index, (raw_uv.0 * scale_s, raw_uv.1 * scale_t));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Command, DisplayList, Model, ModelHeader, TextureSetupHeader, TextureSubHeader, Vertex, VertexStore};
    use crate::texture::TextureType;

    fn test_model(commands: Vec<Command>, texture_offsets: &[u32], vertex_count: usize) -> Model {
        let sub_headers = texture_offsets
            .iter()
            .map(|&segment_offset| TextureSubHeader {
                segment_offset,
                texture_type: TextureType::from_raw(4),
                width: 1,
                height: 1,
            })
            .collect::<Vec<_>>();

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
                vert_count: vertex_count as u16,
            },
            texture_setup: TextureSetupHeader {
                data_length: 0,
                texture_count: sub_headers.len() as u16,
                sub_headers,
            },
            textures: Vec::new(),
            display_list: DisplayList { commands },
            vertex_store: VertexStore {
                vertices: vec![
                    Vertex {
                        position: (0, 0, 0),
                        flag: 0,
                        uv: (1.0, 1.0),
                        color: (255, 255, 255),
                        alpha: 255,
                    };
                    vertex_count
                ],
            },
        }
    }

    #[test]
    fn scenario_s5_emits_one_mesh_with_scaled_uvs() {
        let model = test_model(
            vec![
                Command::Vtx {
                    write_start: 0,
                    verts_to_write: 3,
                    load_address: 0x0200_0000,
                },
                Command::Texture {
                    scale_s: 0x8000 as f32 / 65536.0,
                    scale_t: 0x10000 as f32 / 65536.0,
                },
                Command::SetTImg {
                    segment_address: 0x0200_0080,
                },
                Command::Tri1 { v1: 0, v2: 1, v3: 2 },
            ],
            &[0x00, 0x80],
            3,
        );

        let sim = simulate(&model);
        assert_eq!(sim.meshes.len(), 1);
        let mesh = &sim.meshes[0];
        assert_eq!(mesh.texture_index, Some(1));
        assert_eq!(mesh.indices, vec![(0, 1, 2)]);

        for v in 0..3u16 {
            assert_eq!(sim.uv_overrides[&v], (0.5, 1.0));
        }
    }

    #[test]
    fn uv_is_scaled_only_on_first_reference() {
        let model = test_model(
            vec![
                Command::Vtx {
                    write_start: 0,
                    verts_to_write: 1,
                    load_address: 0,
                },
                Command::Texture {
                    scale_s: 2.0,
                    scale_t: 2.0,
                },
                Command::Tri1 { v1: 0, v2: 0, v3: 0 },
                Command::Texture {
                    scale_s: 4.0,
                    scale_t: 4.0,
                },
                Command::Tri1 { v1: 0, v2: 0, v3: 0 },
            ],
            &[],
            1,
        );

        let sim = simulate(&model);
        assert_eq!(sim.uv_overrides[&0], (2.0, 2.0));
    }

    #[test]
    fn empty_meshes_are_never_emitted() {
        let model = test_model(vec![Command::SetTImg { segment_address: 0 }], &[0], 0);
        let sim = simulate(&model);
        assert!(sim.meshes.is_empty());
    }
}
