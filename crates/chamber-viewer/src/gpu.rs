// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! GPU setup and the base scene pass resources for the viewer.

use anyhow::Result;
use chamber_outline::{DrawCategory, GpuGeom, MeshVertex, PointInstance, SCENE_FORMAT};
use chamber_scene::PointShader;
use egui_winit::winit::dpi::PhysicalSize;
use egui_winit::winit::window::Window;
use std::sync::Arc;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const UNIFORM_STRIDE: u64 = 256;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneGlobals {
    pub view_proj: [[f32; 4]; 4],
    pub light_dir: [f32; 3],
    pub _pad: f32,
    pub viewport: [f32; 2],
    pub _pad2: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawUniforms {
    model: [[f32; 4]; 4],
    color: [f32; 4],
    point_size: f32,
    shader_kind: f32,
    _pad: [f32; 2],
}

pub struct ScenePipelines {
    pub mesh: wgpu::RenderPipeline,
    pub lines: wgpu::RenderPipeline,
    pub points: wgpu::RenderPipeline,
}

pub struct Gpu {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub sample_count: u32,
    pub max_tex: u32,
    pub msaa_color: wgpu::TextureView,
    pub msaa_depth: wgpu::TextureView,
    pub pipelines: ScenePipelines,
    globals_buf: wgpu::Buffer,
    globals_bg: wgpu::BindGroup,
    draw_layout: wgpu::BindGroupLayout,
    draw_buf: wgpu::Buffer,
    draw_bg: wgpu::BindGroup,
    draw_capacity: u64,
}

impl Gpu {
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone())?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .expect("GPU adapter");
        let limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("chamber-viewer-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults()
                    .using_resolution(limits.clone()),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
            })
            .await?;

        let size = window.inner_size();
        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(caps.formats[0]);
        let max_dim = limits.max_texture_dimension_2d;
        let sample_count = 4;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.min(max_dim).max(1),
            height: size.height.min(max_dim).max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let msaa_color = create_msaa(&device, SCENE_FORMAT, config.width, config.height, sample_count);
        let msaa_depth = create_msaa(&device, DEPTH_FORMAT, config.width, config.height, sample_count);

        let shader = device.create_shader_module(wgpu::include_wgsl!("scene.wgsl"));

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene_globals_layout"),
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
        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene_draw_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let globals_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene_globals"),
            size: std::mem::size_of::<SceneGlobals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let globals_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scene_globals_bg"),
            layout: &globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buf.as_entire_binding(),
            }],
        });

        let draw_capacity = 1024;
        let (draw_buf, draw_bg) = create_draw_buffer(&device, &draw_layout, draw_capacity);

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene_pipeline_layout"),
            bind_group_layouts: &[&globals_layout, &draw_layout],
            push_constant_ranges: &[],
        });

        const MESH_ATTRS: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
        let mesh_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &MESH_ATTRS,
        };
        const POINT_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
        let point_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<PointInstance>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &POINT_ATTRS,
        };

        let make = |vs: &'static str,
                    fs: &'static str,
                    topology: wgpu::PrimitiveTopology,
                    buffers: &[wgpu::VertexBufferLayout<'static>]| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("scene_pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some(vs),
                    compilation_options: Default::default(),
                    buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(fs),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: SCENE_FORMAT,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: sample_count,
                    ..Default::default()
                },
                multiview: None,
                cache: None,
            })
        };

        let pipelines = ScenePipelines {
            mesh: make(
                "vs_mesh",
                "fs_mesh",
                wgpu::PrimitiveTopology::TriangleList,
                &[mesh_layout.clone()],
            ),
            lines: make(
                "vs_mesh",
                "fs_flat",
                wgpu::PrimitiveTopology::LineList,
                &[mesh_layout],
            ),
            points: make(
                "vs_point",
                "fs_point",
                wgpu::PrimitiveTopology::TriangleStrip,
                &[point_layout],
            ),
        };

        Ok(Self {
            surface,
            device,
            queue,
            config,
            sample_count,
            max_tex: max_dim,
            msaa_color,
            msaa_depth,
            pipelines,
            globals_buf,
            globals_bg,
            draw_layout,
            draw_buf,
            draw_bg,
            draw_capacity,
        })
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.config.width = size.width.min(self.max_tex);
        self.config.height = size.height.min(self.max_tex);
        self.surface.configure(&self.device, &self.config);
        self.msaa_color = create_msaa(
            &self.device,
            SCENE_FORMAT,
            self.config.width,
            self.config.height,
            self.sample_count,
        );
        self.msaa_depth = create_msaa(
            &self.device,
            DEPTH_FORMAT,
            self.config.width,
            self.config.height,
            self.sample_count,
        );
    }

    /// Render the base scene into the compositor's scene-color target
    /// (MSAA, resolved on store).
    pub fn render_scene(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        resolve_to: &wgpu::TextureView,
        globals: &SceneGlobals,
        draws: &[&GpuGeom],
    ) {
        self.queue
            .write_buffer(&self.globals_buf, 0, bytemuck::bytes_of(globals));
        self.ensure_draw_capacity(draws.len() as u64);
        for (i, geom) in draws.iter().enumerate() {
            let u = DrawUniforms {
                model: geom.model,
                color: geom.color,
                point_size: geom.point_size,
                shader_kind: match geom.shader {
                    PointShader::Flat => 0.0,
                    PointShader::Sprite => 1.0,
                },
                _pad: [0.0; 2],
            };
            self.queue
                .write_buffer(&self.draw_buf, i as u64 * UNIFORM_STRIDE, bytemuck::bytes_of(&u));
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("scene_base_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.msaa_color,
                resolve_target: Some(resolve_to),
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: 0.05,
                        g: 0.06,
                        b: 0.08,
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.msaa_depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_bind_group(0, &self.globals_bg, &[]);
        for (i, geom) in draws.iter().enumerate() {
            let pipeline = match geom.category {
                DrawCategory::Mesh => &self.pipelines.mesh,
                DrawCategory::Lines => &self.pipelines.lines,
                DrawCategory::Points => &self.pipelines.points,
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(1, &self.draw_bg, &[(i as u64 * UNIFORM_STRIDE) as u32]);
            pass.set_vertex_buffer(0, geom.vbuf.slice(..));
            match geom.category {
                DrawCategory::Mesh => {
                    if let Some(ibuf) = &geom.ibuf {
                        pass.set_index_buffer(ibuf.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(0..geom.icount, 0, 0..1);
                    } else {
                        pass.draw(0..geom.count, 0..1);
                    }
                }
                DrawCategory::Lines => pass.draw(0..geom.count, 0..1),
                DrawCategory::Points => pass.draw(0..4, 0..geom.count),
            }
        }
    }

    fn ensure_draw_capacity(&mut self, draws: u64) {
        if draws <= self.draw_capacity {
            return;
        }
        let mut capacity = self.draw_capacity;
        while capacity < draws {
            capacity *= 2;
        }
        let (buf, bg) = create_draw_buffer(&self.device, &self.draw_layout, capacity);
        self.draw_buf = buf;
        self.draw_bg = bg;
        self.draw_capacity = capacity;
    }
}

// Helpers ------------------------------------------------------------

fn create_msaa(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    w: u32,
    h: u32,
    sample_count: u32,
) -> wgpu::TextureView {
    let tex = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("scene_msaa"),
        size: wgpu::Extent3d {
            width: w.max(1),
            height: h.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    tex.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_draw_buffer(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    capacity: u64,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buf = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("scene_draw_uniforms"),
        size: capacity * UNIFORM_STRIDE,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("scene_draw_bg"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buf,
                offset: 0,
                size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniforms>() as u64),
            }),
        }],
    });
    (buf, bg)
}
