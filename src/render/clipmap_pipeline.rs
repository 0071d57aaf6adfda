//! Clipmap terrain render pipeline
//!
//! All shared meshes live in one vertex buffer and one index buffer. The
//! per-draw parameters of a frame are packed into a uniform buffer at the
//! device's dynamic offset alignment, so the whole frame is a single
//! render pass with one bind group switch per draw.

use std::collections::HashMap;
use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use wgpu::util::DeviceExt;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::render::clipmap_textures::WgpuTerrainTextures;
use crate::terrain::clipmap::{ClipMapMeshes, DrawParams, FrameParams, MeshKind, TerrainRenderer};

/// Frame uniforms (matches `Frame` in clipmap_terrain.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub frame: FrameParams,
}

/// Width of the height-to-colour palette texture
pub const PALETTE_SIZE: usize = 256;

const DRAW_PARAMS_SIZE: u64 = std::mem::size_of::<DrawParams>() as u64;
const INITIAL_DRAW_CAPACITY: usize = 64;

/// Byte stride between draws in the dynamic uniform buffer
pub fn draw_stride(min_offset_alignment: u32) -> u64 {
    DRAW_PARAMS_SIZE.next_multiple_of(min_offset_alignment.max(1) as u64)
}

/// Height palette from deep water up to snow, indexed by normalized height
pub fn default_palette() -> Vec<[u8; 4]> {
    const STOPS: [(f32, [f32; 3]); 6] = [
        (0.0, [0.10, 0.18, 0.35]),
        (0.30, [0.20, 0.40, 0.55]),
        (0.35, [0.76, 0.70, 0.50]),
        (0.50, [0.25, 0.50, 0.20]),
        (0.75, [0.45, 0.40, 0.35]),
        (1.0, [0.95, 0.95, 0.97]),
    ];

    (0..PALETTE_SIZE)
        .map(|i| {
            let t = i as f32 / (PALETTE_SIZE - 1) as f32;
            let upper = STOPS.iter().position(|(at, _)| *at >= t).unwrap_or(STOPS.len() - 1).max(1);
            let (a, ca) = STOPS[upper - 1];
            let (b, cb) = STOPS[upper];
            let f = ((t - a) / (b - a)).clamp(0.0, 1.0);
            let channel = |c: usize| ((ca[c] + (cb[c] - ca[c]) * f) * 255.0).round() as u8;
            [channel(0), channel(1), channel(2), 255]
        })
        .collect()
}

#[derive(Clone, Debug)]
struct MeshRange {
    base_vertex: i32,
    indices: Range<u32>,
}

/// [`TerrainRenderer`] that records a frame's draws and replays them in a
/// wgpu render pass.
///
/// [`ClipMap::render`](crate::terrain::ClipMap::render) fills the draw list;
/// [`encode`](Self::encode) records the pass.
pub struct WgpuClipMapRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    draw_layout: wgpu::BindGroupLayout,
    draw_buffer: wgpu::Buffer,
    draw_bind_group: wgpu::BindGroup,
    draw_capacity: usize,
    draw_stride: u64,
    texture_bind_group: wgpu::BindGroup,
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
    mesh_ranges: HashMap<MeshKind, MeshRange>,
    view_proj: Mat4,
    frame: FrameParams,
    draws: Vec<(MeshKind, DrawParams)>,
    clear_color: wgpu::Color,
}

impl WgpuClipMapRenderer {
    /// Create the pipeline and bind the clipmap textures.
    ///
    /// `textures` must already be allocated, which
    /// [`ClipMap::new`](crate::terrain::ClipMap::new) does.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
        textures: &WgpuTerrainTextures,
    ) -> Result<Self> {
        let (Some(elevation_view), Some(normals_view)) = (textures.elevation_view(), textures.normals_view()) else {
            return Err(Error::Gpu("clipmap renderer needs allocated terrain textures".into()));
        };

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("clipmap_terrain_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/clipmap_terrain.wgsl").into()),
        });

        // Bind group 0: frame uniforms
        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("clipmap_frame_uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("clipmap_frame_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("clipmap_frame_bind_group"),
            layout: &frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });

        // Bind group 1: per-draw params at a dynamic offset
        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("clipmap_draw_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(DRAW_PARAMS_SIZE),
                },
                count: None,
            }],
        });
        let draw_stride = draw_stride(device.limits().min_uniform_buffer_offset_alignment);
        let draw_buffer = create_draw_buffer(device, draw_stride, INITIAL_DRAW_CAPACITY);
        let draw_bind_group = create_draw_bind_group(device, &draw_layout, &draw_buffer);

        // Bind group 2: elevation, normals and palette
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("clipmap_texture_layout"),
            entries: &[
                // Elevation array (R32Float)
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        multisampled: false,
                    },
                    count: None,
                },
                // Normal array
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        multisampled: false,
                    },
                    count: None,
                },
                // Palette
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let palette = create_palette_texture(device, queue);
        let palette_view = palette.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("clipmap_palette_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let texture_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("clipmap_texture_bind_group"),
            layout: &texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(elevation_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(normals_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&palette_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("clipmap_terrain_pipeline_layout"),
            bind_group_layouts: &[&frame_layout, &draw_layout, &texture_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("clipmap_terrain_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        offset: 0,
                        shader_location: 0,
                        format: wgpu::VertexFormat::Float32x2,
                    }],
                }],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                // Mesh winding differs between kinds; the terrain is a height field
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: depth_format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview_mask: None,
            cache: None,
        });

        Ok(Self {
            device: device.clone(),
            queue: queue.clone(),
            pipeline,
            frame_buffer,
            frame_bind_group,
            draw_layout,
            draw_buffer,
            draw_bind_group,
            draw_capacity: INITIAL_DRAW_CAPACITY,
            draw_stride,
            texture_bind_group,
            vertex_buffer: None,
            index_buffer: None,
            mesh_ranges: HashMap::new(),
            view_proj: Mat4::IDENTITY,
            frame: FrameParams::default(),
            draws: Vec::new(),
            clear_color: wgpu::Color {
                r: 0.62,
                g: 0.72,
                b: 0.82,
                a: 1.0,
            },
        })
    }

    /// Camera transform used by the next [`end_frame`](TerrainRenderer::end_frame)
    pub fn set_camera(&mut self, view_proj: Mat4) {
        self.view_proj = view_proj;
    }

    pub fn set_clear_color(&mut self, color: wgpu::Color) {
        self.clear_color = color;
    }

    pub fn draw_count(&self) -> usize {
        self.draws.len()
    }

    /// Record the last completed frame into `encoder`
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, color_view: &wgpu::TextureView, depth_view: &wgpu::TextureView) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("clipmap_terrain_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.clear_color),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        let (Some(vertex_buffer), Some(index_buffer)) = (&self.vertex_buffer, &self.index_buffer) else {
            return;
        };

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.frame_bind_group, &[]);
        pass.set_bind_group(2, &self.texture_bind_group, &[]);
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);

        for (i, (mesh, _)) in self.draws.iter().enumerate() {
            let Some(range) = self.mesh_ranges.get(mesh) else {
                continue;
            };
            let offset = (i as u64 * self.draw_stride) as u32;
            pass.set_bind_group(1, &self.draw_bind_group, &[offset]);
            pass.draw_indexed(range.indices.clone(), range.base_vertex, 0..1);
        }
    }

    fn ensure_draw_capacity(&mut self, draws: usize) {
        if draws <= self.draw_capacity {
            return;
        }
        let capacity = draws.next_power_of_two();
        log::debug!("Growing clipmap draw buffer to {} draws", capacity);
        self.draw_buffer = create_draw_buffer(&self.device, self.draw_stride, capacity);
        self.draw_bind_group = create_draw_bind_group(&self.device, &self.draw_layout, &self.draw_buffer);
        self.draw_capacity = capacity;
    }
}

impl TerrainRenderer for WgpuClipMapRenderer {
    fn upload_meshes(&mut self, meshes: &ClipMapMeshes) -> Result<()> {
        let mut vertices: Vec<[f32; 2]> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        self.mesh_ranges.clear();

        for (kind, mesh) in meshes.iter() {
            let start = indices.len() as u32;
            let base_vertex = i32::try_from(vertices.len())
                .map_err(|_| Error::Gpu("clipmap meshes exceed the vertex index range".into()))?;
            vertices.extend_from_slice(&mesh.vertices);
            indices.extend_from_slice(&mesh.indices);
            self.mesh_ranges.insert(
                kind,
                MeshRange {
                    base_vertex,
                    indices: start..indices.len() as u32,
                },
            );
        }

        self.vertex_buffer = Some(self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("clipmap_vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        }));
        self.index_buffer = Some(self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("clipmap_indices"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        }));

        log::info!(
            "Uploaded {} clipmap meshes: {} vertices, {} indices",
            self.mesh_ranges.len(),
            vertices.len(),
            indices.len()
        );
        Ok(())
    }

    fn begin_frame(&mut self, frame: &FrameParams) -> Result<()> {
        self.frame = *frame;
        self.draws.clear();
        Ok(())
    }

    fn draw(&mut self, mesh: MeshKind, params: &DrawParams) {
        self.draws.push((mesh, *params));
    }

    fn end_frame(&mut self) -> Result<()> {
        if !self.draws.is_empty() && self.vertex_buffer.is_none() {
            return Err(Error::Gpu("clipmap frame drawn before meshes were uploaded".into()));
        }

        let uniforms = FrameUniforms {
            view_proj: self.view_proj.to_cols_array_2d(),
            frame: self.frame,
        };
        self.queue.write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&uniforms));

        if self.draws.is_empty() {
            return Ok(());
        }
        self.ensure_draw_capacity(self.draws.len());

        let stride = self.draw_stride as usize;
        let mut bytes = vec![0u8; stride * self.draws.len()];
        for (chunk, (_, params)) in bytes.chunks_exact_mut(stride).zip(&self.draws) {
            chunk[..DRAW_PARAMS_SIZE as usize].copy_from_slice(bytemuck::bytes_of(params));
        }
        self.queue.write_buffer(&self.draw_buffer, 0, &bytes);
        Ok(())
    }
}

fn create_draw_buffer(device: &wgpu::Device, stride: u64, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("clipmap_draw_params"),
        size: stride * capacity as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_draw_bind_group(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, buffer: &wgpu::Buffer) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("clipmap_draw_bind_group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset: 0,
                size: wgpu::BufferSize::new(DRAW_PARAMS_SIZE),
            }),
        }],
    })
}

fn create_palette_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> wgpu::Texture {
    let size = wgpu::Extent3d {
        width: PALETTE_SIZE as u32,
        height: 1,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("clipmap_palette"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let palette = default_palette();
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(&palette),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(PALETTE_SIZE as u32 * 4),
            rows_per_image: Some(1),
        },
        size,
    );
    texture
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layouts() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 96);
        assert_eq!(DRAW_PARAMS_SIZE, 48);
    }

    #[test]
    fn test_draw_stride_respects_alignment() {
        assert_eq!(draw_stride(256), 256);
        assert_eq!(draw_stride(16), 48);
        assert_eq!(draw_stride(32), 64);
    }

    #[test]
    fn test_palette_runs_water_to_snow() {
        let palette = default_palette();
        assert_eq!(palette.len(), PALETTE_SIZE);
        let low = palette[0];
        let high = palette[PALETTE_SIZE - 1];
        assert!(low[2] > low[0], "lowest entry should be blue");
        assert!(high.iter().take(3).all(|c| *c > 230));
        assert!(palette.iter().all(|c| c[3] == 255));
    }
}
