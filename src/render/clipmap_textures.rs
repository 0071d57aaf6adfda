//! Clipmap elevation and normal texture arrays on the GPU

use crate::core::error::Error;
use crate::core::types::Result;
use crate::terrain::clipmap::{NormalParams, TerrainTextures, TexelRect};

/// Elevation format: one 32-bit float per texel
pub const ELEVATION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
/// Normal format: xyz + unused w
pub const NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

struct TextureArrays {
    texture_size: u32,
    layers: u32,
    elevation: wgpu::Texture,
    elevation_view: wgpu::TextureView,
    /// Sampling view over every normal layer; the views hold the texture
    normals_view: wgpu::TextureView,
    /// One compute bind group per layer, writing that layer's normals
    normal_bind_groups: Vec<wgpu::BindGroup>,
}

/// [`TerrainTextures`] backed by wgpu texture arrays.
///
/// Elevation writes go straight through `Queue::write_texture`; normal
/// layers are regenerated by a compute pass over the elevation layer.
pub struct WgpuTerrainTextures {
    device: wgpu::Device,
    queue: wgpu::Queue,
    normal_pipeline: wgpu::ComputePipeline,
    normal_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    arrays: Option<TextureArrays>,
}

impl WgpuTerrainTextures {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("clipmap_normals_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/clipmap_normals.wgsl").into()),
        });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("clipmap_normal_params"),
            size: std::mem::size_of::<NormalParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let normal_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("clipmap_normals_layout"),
            entries: &[
                // Normal params
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Elevation array (R32Float)
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        multisampled: false,
                    },
                    count: None,
                },
                // One normal layer
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: NORMAL_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("clipmap_normals_pipeline_layout"),
            bind_group_layouts: &[&normal_layout],
            immediate_size: 0,
        });

        let normal_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("clipmap_normals_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            device: device.clone(),
            queue: queue.clone(),
            normal_pipeline,
            normal_layout,
            params_buffer,
            arrays: None,
        }
    }

    /// Elevation array view, `None` before [`allocate`](TerrainTextures::allocate)
    pub fn elevation_view(&self) -> Option<&wgpu::TextureView> {
        self.arrays.as_ref().map(|a| &a.elevation_view)
    }

    pub fn normals_view(&self) -> Option<&wgpu::TextureView> {
        self.arrays.as_ref().map(|a| &a.normals_view)
    }

    pub fn texture_size(&self) -> u32 {
        self.arrays.as_ref().map_or(0, |a| a.texture_size)
    }

    pub fn layers(&self) -> u32 {
        self.arrays.as_ref().map_or(0, |a| a.layers)
    }

    fn arrays(&self) -> Result<&TextureArrays> {
        self.arrays
            .as_ref()
            .ok_or_else(|| Error::Gpu("clipmap textures used before allocation".into()))
    }

    fn create_array(&self, label: &str, size: u32, layers: u32, format: wgpu::TextureFormat, usage: wgpu::TextureUsages) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        })
    }
}

/// Check a texture array request against the device limits
pub fn check_limits(limits: &wgpu::Limits, texture_size: u32, layers: u32) -> Result<()> {
    let normal_size = texture_size.saturating_mul(2);
    if normal_size > limits.max_texture_dimension_2d {
        return Err(Error::Gpu(format!(
            "clipmap normal texture {}x{} exceeds device limit {}",
            normal_size, normal_size, limits.max_texture_dimension_2d
        )));
    }
    if layers > limits.max_texture_array_layers {
        return Err(Error::Gpu(format!(
            "{} clipmap levels exceed device limit of {} array layers",
            layers, limits.max_texture_array_layers
        )));
    }
    Ok(())
}

impl TerrainTextures for WgpuTerrainTextures {
    fn allocate(&mut self, texture_size: u32, layers: u32) -> Result<()> {
        check_limits(&self.device.limits(), texture_size, layers)?;

        let elevation = self.create_array(
            "clipmap_elevation",
            texture_size,
            layers,
            ELEVATION_FORMAT,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        let normals = self.create_array(
            "clipmap_normals",
            texture_size * 2,
            layers,
            NORMAL_FORMAT,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::STORAGE_BINDING,
        );

        let array_view = |texture: &wgpu::Texture| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                dimension: Some(wgpu::TextureViewDimension::D2Array),
                ..Default::default()
            })
        };
        let elevation_view = array_view(&elevation);
        let normals_view = array_view(&normals);

        let normal_bind_groups = (0..layers)
            .map(|layer| {
                let layer_view = normals.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("clipmap_normal_layer"),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                });
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("clipmap_normals_bind_group"),
                    layout: &self.normal_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: self.params_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&elevation_view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(&layer_view),
                        },
                    ],
                })
            })
            .collect();

        log::info!(
            "Allocated clipmap textures: {} layers, elevation {}², normals {}²",
            layers,
            texture_size,
            texture_size * 2
        );

        self.arrays = Some(TextureArrays {
            texture_size,
            layers,
            elevation,
            elevation_view,
            normals_view,
            normal_bind_groups,
        });
        Ok(())
    }

    fn write_elevation(&mut self, layer: u32, rect: TexelRect, data: &[f32]) -> Result<()> {
        let arrays = self.arrays()?;
        if layer >= arrays.layers
            || rect.x + rect.width > arrays.texture_size
            || rect.y + rect.height > arrays.texture_size
            || data.len() != rect.area()
        {
            return Err(Error::Gpu(format!(
                "elevation write {:?} on layer {} does not fit {} layers of {}²",
                rect, layer, arrays.layers, arrays.texture_size
            )));
        }
        if rect.area() == 0 {
            return Ok(());
        }

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &arrays.elevation,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(data),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(rect.width * 4),
                rows_per_image: Some(rect.height),
            },
            wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn update_normals(&mut self, params: &NormalParams) -> Result<()> {
        let arrays = self.arrays()?;
        let bind_group = arrays
            .normal_bind_groups
            .get(params.layer as usize)
            .ok_or_else(|| Error::Gpu(format!("normal layer {} out of range", params.layer)))?;

        // Each layer is its own submission so the shared params buffer
        // holds the right layer when the dispatch runs
        self.queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(params));

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("clipmap_normals_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("clipmap_normals_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.normal_pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            let groups = (arrays.texture_size * 2).div_ceil(8);
            pass.dispatch_workgroups(groups, groups, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}
