//! Command-line front end for `bk64model`.
//!
//! Thin glue only: every subcommand loads bytes, calls into the library,
//! and hands the neutral result to `image`/`gltf-json` for on-disk output.
//! No parsing or simulation logic lives here.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bk64model::export::{self, PackedAsset};
use bk64model::interpreter;
use bk64model::model::Model;
use bk64model::scanner;
use clap::{Parser, Subcommand};
use gltf_json as gltf;
use log::{debug, info, warn};

#[derive(Parser)]
#[command(name = "bk64model", version, about = "Extract 3D models from a N64-era cartridge image")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a cartridge image and write one `<offset>_model.bin` per model found.
    DumpModels {
        rom: PathBuf,
        #[arg(short, long, default_value = "models")]
        out: PathBuf,
    },
    /// Decode a model's textures and write one PNG per texture.
    DumpModelTextures {
        model: PathBuf,
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Parse, simulate, and export one glTF (+ bin + PNGs) per model.
    DumpModelGltf {
        models: Vec<PathBuf>,
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Run `dump-model-gltf` over every `*_model.bin` file in a directory.
    ConvertAllModels {
        dir: PathBuf,
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::DumpModels { rom, out } => dump_models(&rom, &out),
        Command::DumpModelTextures { model, out } => dump_model_textures(&model, &out),
        Command::DumpModelGltf { models, out } => {
            for model in &models {
                dump_model_gltf(model, &out)?;
            }
            Ok(())
        }
        Command::ConvertAllModels { dir, out } => convert_all_models(&dir, &out),
    }
}

fn dump_models(rom: &Path, out: &Path) -> Result<()> {
    let data = fs::read(rom).with_context(|| format!("reading {}", rom.display()))?;
    info!("{} bytes read from {}", data.len(), rom.display());

    fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;

    let found = scanner::find_models(&data);
    info!("found {} models", found.len());

    for entry in &found {
        let path = out.join(format!("{}_model.bin", entry.offset));
        fs::write(&path, &entry.bytes).with_context(|| format!("writing {}", path.display()))?;
        debug!("wrote {}", path.display());
    }

    Ok(())
}

fn dump_model_textures(model_path: &Path, out: &Path) -> Result<()> {
    let model = load_model(model_path)?;
    fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;

    info!(
        "texture_count={}",
        model.texture_setup.texture_count
    );

    let stem = model_stem(model_path);
    for (i, tex) in model.textures.iter().enumerate() {
        let Some(ty) = tex.texture_type else {
            warn!("texture {i} has an unrecognized type, skipping");
            continue;
        };
        let pixels = bk64model::texture::decode(ty, &tex.data, tex.width, tex.height)?;
        let path = out.join(format!("{stem}_texture_{i}.png"));
        write_png(&path, tex.width, tex.height, &pixels)?;
        debug!("wrote {} ({}x{})", path.display(), tex.width, tex.height);
    }

    Ok(())
}

fn dump_model_gltf(model_path: &Path, out: &Path) -> Result<()> {
    let model = load_model(model_path)?;
    let sim = interpreter::simulate(&model);
    let packed = export::pack(&model, &sim)?;

    fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    let stem = model_stem(model_path);

    for (i, tex) in packed.textures.iter().enumerate() {
        if tex.pixels.is_empty() {
            continue;
        }
        let path = out.join(format!("{stem}_texture_{i}.png"));
        write_png(&path, tex.width, tex.height, &tex.pixels)?;
    }

    let bin_name = format!("{stem}.bin");
    let bin_path = out.join(&bin_name);
    fs::write(&bin_path, combined_buffer(&packed))
        .with_context(|| format!("writing {}", bin_path.display()))?;

    let root = build_gltf(&stem, &bin_name, &packed);
    let gltf_path = out.join(format!("{stem}.gltf"));
    let json = gltf::serialize::to_string_pretty(&root).context("serializing glTF JSON")?;
    fs::write(&gltf_path, json).with_context(|| format!("writing {}", gltf_path.display()))?;

    info!(
        "exported {} ({} meshes, {} vertices)",
        gltf_path.display(),
        packed.meshes.len(),
        packed.vertex_count
    );
    Ok(())
}

fn convert_all_models(dir: &Path, out: &Path) -> Result<()> {
    let mut any = false;
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        let is_model = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("_model.bin"));
        if is_model {
            any = true;
            dump_model_gltf(&path, out)?;
        }
    }
    if !any {
        warn!("no *_model.bin files found in {}", dir.display());
    }
    Ok(())
}

fn load_model(path: &Path) -> Result<Model> {
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Model::parse(&data).with_context(|| format!("parsing {}", path.display()))
}

fn model_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model")
        .to_string()
}

fn write_png(path: &Path, width: u8, height: u8, pixels: &[(u8, u8, u8, u8)]) -> Result<()> {
    if width == 0 || height == 0 {
        bail!("texture has zero dimension");
    }
    let mut raw = Vec::with_capacity(pixels.len() * 4);
    for &(r, g, b, a) in pixels {
        raw.extend_from_slice(&[r, g, b, a]);
    }
    let buffer = image::RgbaImage::from_raw(width as u32, height as u32, raw)
        .context("pixel buffer does not match declared dimensions")?;
    buffer
        .save(path)
        .with_context(|| format!("saving {}", path.display()))
}

/// Lay out the single `.bin` file the exported glTF references: the vertex
/// buffer first, then the index buffer immediately after (both already
/// 4-byte padded by [`export::pack`]).
fn combined_buffer(packed: &PackedAsset) -> Vec<u8> {
    let mut buf = packed.vertex_buffer.clone();
    buf.extend_from_slice(&packed.index_buffer);
    buf
}

fn build_gltf(stem: &str, bin_name: &str, packed: &PackedAsset) -> gltf::Root {
    let mut root = gltf::Root {
        asset: gltf::Asset {
            version: "2.0".to_string(),
            generator: Some("bk64model".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    let buffer = gltf::Index::push(
        &mut root.buffers,
        gltf::Buffer {
            byte_length: gltf::validation::USize64(
                (packed.vertex_buffer.len() + packed.index_buffer.len()) as u64,
            ),
            uri: Some(bin_name.to_string()),
            name: None,
            extensions: None,
            extras: Default::default(),
        },
    );

    let vertex_view = gltf::Index::push(
        &mut root.buffer_views,
        gltf::buffer::View {
            buffer,
            byte_length: gltf::validation::USize64(packed.vertex_buffer.len() as u64),
            byte_offset: Some(gltf::validation::USize64(0)),
            byte_stride: Some(gltf::buffer::Stride(export::VERTEX_STRIDE)),
            name: None,
            target: Some(gltf::validation::Checked::Valid(
                gltf::buffer::Target::ArrayBuffer,
            )),
            extensions: None,
            extras: Default::default(),
        },
    );

    let index_view = gltf::Index::push(
        &mut root.buffer_views,
        gltf::buffer::View {
            buffer,
            byte_length: gltf::validation::USize64(packed.index_buffer.len() as u64),
            byte_offset: Some(gltf::validation::USize64(packed.vertex_buffer.len() as u64)),
            byte_stride: None,
            name: None,
            target: Some(gltf::validation::Checked::Valid(
                gltf::buffer::Target::ElementArrayBuffer,
            )),
            extensions: None,
            extras: Default::default(),
        },
    );

    let position_accessor = packed.position_bounds.map(|bounds| {
        gltf::Index::push(
            &mut root.accessors,
            gltf::Accessor {
                buffer_view: Some(vertex_view),
                byte_offset: Some(gltf::validation::USize64(0)),
                count: gltf::validation::USize64(packed.vertex_count as u64),
                component_type: gltf::validation::Checked::Valid(
                    gltf::accessor::GenericComponentType(gltf::accessor::ComponentType::F32),
                ),
                type_: gltf::validation::Checked::Valid(gltf::accessor::Type::Vec3),
                min: Some(serde_json::json!(bounds.min.to_vec())),
                max: Some(serde_json::json!(bounds.max.to_vec())),
                name: None,
                normalized: false,
                sparse: None,
                extensions: None,
                extras: Default::default(),
            },
        )
    });

    let color_accessor = gltf::Index::push(
        &mut root.accessors,
        gltf::Accessor {
            buffer_view: Some(vertex_view),
            byte_offset: Some(gltf::validation::USize64(12)),
            count: gltf::validation::USize64(packed.vertex_count as u64),
            component_type: gltf::validation::Checked::Valid(gltf::accessor::GenericComponentType(
                gltf::accessor::ComponentType::U8,
            )),
            type_: gltf::validation::Checked::Valid(gltf::accessor::Type::Vec3),
            min: None,
            max: None,
            name: None,
            normalized: true,
            sparse: None,
            extensions: None,
            extras: Default::default(),
        },
    );

    let uv_accessor = gltf::Index::push(
        &mut root.accessors,
        gltf::Accessor {
            buffer_view: Some(vertex_view),
            byte_offset: Some(gltf::validation::USize64(16)),
            count: gltf::validation::USize64(packed.vertex_count as u64),
            component_type: gltf::validation::Checked::Valid(gltf::accessor::GenericComponentType(
                gltf::accessor::ComponentType::F32,
            )),
            type_: gltf::validation::Checked::Valid(gltf::accessor::Type::Vec2),
            min: None,
            max: None,
            name: None,
            normalized: false,
            sparse: None,
            extensions: None,
            extras: Default::default(),
        },
    );

    let mut texture_indices = vec![None; packed.textures.len()];
    for (i, tex) in packed.textures.iter().enumerate() {
        if tex.pixels.is_empty() {
            continue;
        }
        let image = gltf::Index::push(
            &mut root.images,
            gltf::Image {
                uri: Some(format!("{stem}_texture_{i}.png")),
                buffer_view: None,
                mime_type: None,
                name: None,
                extensions: None,
                extras: Default::default(),
            },
        );
        let texture = gltf::Index::push(
            &mut root.textures,
            gltf::Texture {
                sampler: None,
                source: image,
                name: None,
                extensions: None,
                extras: Default::default(),
            },
        );
        texture_indices[i] = Some(texture);
    }

    let mut material_for_texture = std::collections::HashMap::new();
    let mut primitives = Vec::with_capacity(packed.meshes.len());

    for mesh in &packed.meshes {
        let material = mesh.texture_index.and_then(|ti| {
            let texture = texture_indices.get(ti).copied().flatten()?;
            Some(*material_for_texture.entry(ti).or_insert_with(|| {
                gltf::Index::push(
                    &mut root.materials,
                    gltf::Material {
                        pbr_metallic_roughness: gltf::material::PbrMetallicRoughness {
                            base_color_texture: Some(gltf::texture::Info {
                                index: texture,
                                tex_coord: 0,
                                extensions: None,
                                extras: Default::default(),
                            }),
                            ..Default::default()
                        },
                        alpha_mode: gltf::validation::Checked::Valid(
                            gltf::material::AlphaMode::Mask,
                        ),
                        ..Default::default()
                    },
                )
            }))
        });

        let indices_accessor = gltf::Index::push(
            &mut root.accessors,
            gltf::Accessor {
                buffer_view: Some(index_view),
                byte_offset: Some(gltf::validation::USize64(mesh.byte_offset as u64)),
                count: gltf::validation::USize64(mesh.count as u64),
                component_type: gltf::validation::Checked::Valid(
                    gltf::accessor::GenericComponentType(gltf::accessor::ComponentType::U16),
                ),
                type_: gltf::validation::Checked::Valid(gltf::accessor::Type::Scalar),
                min: Some(serde_json::json!([mesh.bounds.min])),
                max: Some(serde_json::json!([mesh.bounds.max])),
                name: None,
                normalized: false,
                sparse: None,
                extensions: None,
                extras: Default::default(),
            },
        );

        let mut attributes = std::collections::BTreeMap::new();
        if let Some(pos) = position_accessor {
            attributes.insert(
                gltf::validation::Checked::Valid(gltf::mesh::Semantic::Positions),
                pos,
            );
        }
        attributes.insert(
            gltf::validation::Checked::Valid(gltf::mesh::Semantic::Colors(0)),
            color_accessor,
        );
        attributes.insert(
            gltf::validation::Checked::Valid(gltf::mesh::Semantic::TexCoords(0)),
            uv_accessor,
        );

        primitives.push(gltf::mesh::Primitive {
            attributes,
            indices: Some(indices_accessor),
            material,
            mode: gltf::validation::Checked::Valid(gltf::mesh::Mode::Triangles),
            targets: None,
            extensions: None,
            extras: Default::default(),
        });
    }

    let mesh = gltf::Index::push(
        &mut root.meshes,
        gltf::Mesh {
            primitives,
            weights: None,
            name: Some(stem.to_string()),
            extensions: None,
            extras: Default::default(),
        },
    );

    let node = gltf::Index::push(
        &mut root.nodes,
        gltf::scene::Node {
            mesh: Some(mesh),
            ..Default::default()
        },
    );

    let scene = gltf::Index::push(
        &mut root.scenes,
        gltf::Scene {
            nodes: vec![node],
            name: None,
            extensions: None,
            extras: Default::default(),
        },
    );
    root.scene = Some(scene);

    root
}
