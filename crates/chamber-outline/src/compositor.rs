// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The GPU half of outline rendering: render-target ownership and the
//! per-frame pass chain (depth pre-pass → mask accumulation → downsample →
//! per-channel edge coloring → two-stage separable blur → overlay).
//!
//! All targets and pipelines are private to this struct; they resize in
//! lock-step with the owning viewport and die with it. With no registrations
//! the chain degenerates to one blit of the scene color to the output.

use chamber_scene::{ChannelKind, PointShader};

use crate::geom::{DrawCategory, GpuGeom, MeshVertex, PointInstance};
use crate::registry::{OutlineParams, HIGHLIGHT_EDGE, SELECT_EDGE};

/// Format of the offscreen scene color target the viewer renders into.
pub const SCENE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const MASK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// Kernel radius of the quarter-resolution glow blur.
const GLOW_KERNEL: f32 = 4.0;
const UNIFORM_STRIDE: u64 = 256;

// post-uniform slots, one stride apiece
const SLOT_BLIT: u64 = 0;
const SLOT_EDGE_SELECT: u64 = 1;
const SLOT_EDGE_HIGHLIGHT: u64 = 2;
const SLOT_BLUR1_H: u64 = 3;
const SLOT_BLUR1_V: u64 = 4;
const SLOT_BLUR2_H: u64 = 5;
const SLOT_BLUR2_V: u64 = 6;
const SLOT_OVERLAY: u64 = 7;
const POST_SLOTS: u64 = 8;

/// Per-frame camera and viewport state shared by every geometry pass.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Globals {
    pub view_proj: [[f32; 4]; 4],
    pub viewport: [f32; 2],
    pub cam_near: f32,
    pub cam_far: f32,
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

#[repr(C)]
#[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct PostUniforms {
    texel: [f32; 2],
    direction: [f32; 2],
    visible: [f32; 3],
    kernel: f32,
    hidden: [f32; 3],
    channel: f32,
    edge_strength: f32,
    edge_glow: f32,
    _pad: [f32; 2],
}

/// One base-scene draw, flagged when the element carries a registration
/// (selected draws are left out of the depth pre-pass).
pub struct SceneDraw<'a> {
    pub geom: &'a GpuGeom,
    pub selected: bool,
}

/// One mask group resolved to GPU geometry: items share a rendering
/// signature and each carries the channel whose membership it writes.
pub struct GpuMaskGroup<'a> {
    pub items: Vec<(&'a GpuGeom, ChannelKind)>,
}

/// Everything the compositor consumes for one frame.
pub struct OutlineFrame<'a> {
    pub globals: Globals,
    pub scene: &'a [SceneDraw<'a>],
    pub groups: &'a [GpuMaskGroup<'a>],
}

struct Targets {
    scene_color: wgpu::TextureView,
    depth_full: wgpu::TextureView,
    mask_color: wgpu::TextureView,
    mask_depth: wgpu::TextureView,
    mask_half: wgpu::TextureView,
    edge_half: wgpu::TextureView,
    blur_half: wgpu::TextureView,
    edge_quarter: wgpu::TextureView,
    blur_quarter: wgpu::TextureView,
}

struct Pipelines {
    depth_mesh: wgpu::RenderPipeline,
    depth_lines: wgpu::RenderPipeline,
    depth_points: wgpu::RenderPipeline,
    /// [category: mesh, lines, points][channel: select, highlight]
    mask: [[wgpu::RenderPipeline; 2]; 3],
    downsample: wgpu::RenderPipeline,
    blit: wgpu::RenderPipeline,
    edge: wgpu::RenderPipeline,
    blur: wgpu::RenderPipeline,
    overlay: wgpu::RenderPipeline,
}

struct FrameBindGroups {
    depth_tex: wgpu::BindGroup,
    src_scene: wgpu::BindGroup,
    src_mask_full: wgpu::BindGroup,
    src_mask_half: wgpu::BindGroup,
    src_edge_half: wgpu::BindGroup,
    src_blur_half: wgpu::BindGroup,
    src_blur_quarter: wgpu::BindGroup,
    overlay_tex: wgpu::BindGroup,
}

/// Owns the outline pass chain. See the module docs for the sequence.
pub struct OutlineCompositor {
    params: OutlineParams,
    width: u32,
    height: u32,

    sampler: wgpu::Sampler,
    draw_layout: wgpu::BindGroupLayout,
    depth_tex_layout: wgpu::BindGroupLayout,
    post_layout: wgpu::BindGroupLayout,
    overlay_tex_layout: wgpu::BindGroupLayout,

    globals_buf: wgpu::Buffer,
    globals_bg: wgpu::BindGroup,
    post_buf: wgpu::Buffer,
    draw_buf: wgpu::Buffer,
    draw_bg: wgpu::BindGroup,
    draw_capacity: u64,

    pipelines: Pipelines,
    targets: Targets,
    binds: FrameBindGroups,
}

impl OutlineCompositor {
    pub fn new(
        device: &wgpu::Device,
        output_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        params: OutlineParams,
    ) -> Self {
        let shader_mask = device.create_shader_module(wgpu::include_wgsl!("mask.wgsl"));
        let shader_post = device.create_shader_module(wgpu::include_wgsl!("post.wgsl"));

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("outline_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("outline_globals_layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT, false)],
        });
        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("outline_draw_layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT, true)],
        });
        let depth_tex_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("outline_depth_tex_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Depth,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });
        let post_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("outline_post_layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT, true),
                texture_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let overlay_tex_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("outline_overlay_tex_layout"),
            entries: &[texture_entry(0), texture_entry(1), texture_entry(2)],
        });

        let globals_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("outline_globals"),
            size: std::mem::size_of::<Globals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let globals_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("outline_globals_bg"),
            layout: &globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buf.as_entire_binding(),
            }],
        });
        let post_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("outline_post_uniforms"),
            size: POST_SLOTS * UNIFORM_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let draw_capacity = 256;
        let (draw_buf, draw_bg) = create_draw_buffer(device, &draw_layout, draw_capacity);

        let pipelines = create_pipelines(
            device,
            &shader_mask,
            &shader_post,
            &globals_layout,
            &draw_layout,
            &depth_tex_layout,
            &post_layout,
            &overlay_tex_layout,
            output_format,
        );

        let targets = create_targets(device, width, height, params.downsample_ratio);
        let binds = create_frame_binds(
            device,
            &targets,
            &depth_tex_layout,
            &post_layout,
            &overlay_tex_layout,
            &post_buf,
            &sampler,
        );

        Self {
            params,
            width,
            height,
            sampler,
            draw_layout,
            depth_tex_layout,
            post_layout,
            overlay_tex_layout,
            globals_buf,
            globals_bg,
            post_buf,
            draw_buf,
            draw_bg,
            draw_capacity,
            pipelines,
            targets,
            binds,
        }
    }

    /// Offscreen color target the viewer's base pass resolves into.
    pub fn scene_view(&self) -> &wgpu::TextureView {
        &self.targets.scene_color
    }

    pub fn params(&self) -> OutlineParams {
        self.params
    }

    /// Replace the tunables. A ratio change takes effect on the next resize.
    pub fn set_params(&mut self, params: OutlineParams) {
        self.params = params;
    }

    /// Recreate every size-dependent target and bind group.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.width = width;
        self.height = height;
        self.targets = create_targets(device, width, height, self.params.downsample_ratio);
        self.binds = create_frame_binds(
            device,
            &self.targets,
            &self.depth_tex_layout,
            &self.post_layout,
            &self.overlay_tex_layout,
            &self.post_buf,
            &self.sampler,
        );
    }

    /// Run the outline chain for one frame, writing the final image to
    /// `output`. With no mask groups this is a single scene-color blit.
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        frame: &OutlineFrame<'_>,
        output: &wgpu::TextureView,
    ) {
        queue.write_buffer(&self.globals_buf, 0, bytemuck::bytes_of(&frame.globals));
        self.write_post_uniforms(queue);

        if frame.groups.is_empty() {
            self.fullscreen(
                encoder,
                &self.pipelines.blit,
                &self.binds.src_scene,
                SLOT_BLIT,
                output,
                None,
            );
            return;
        }

        // per-draw uniform slots: depth draws first, mask items after
        let mut uniforms: Vec<DrawUniforms> = Vec::new();
        let mut depth_draws: Vec<(u32, &GpuGeom)> = Vec::new();
        for d in frame.scene.iter().filter(|d| !d.selected) {
            depth_draws.push((slot_offset(uniforms.len()), d.geom));
            uniforms.push(draw_uniforms(d.geom));
        }
        let mut mask_draws: Vec<(u32, &GpuGeom, ChannelKind)> = Vec::new();
        for group in frame.groups {
            for &(geom, channel) in &group.items {
                mask_draws.push((slot_offset(uniforms.len()), geom, channel));
                uniforms.push(draw_uniforms(geom));
            }
        }
        self.ensure_draw_capacity(device, uniforms.len() as u64);
        for (i, u) in uniforms.iter().enumerate() {
            queue.write_buffer(
                &self.draw_buf,
                i as u64 * UNIFORM_STRIDE,
                bytemuck::bytes_of(u),
            );
        }

        // 1. depth pre-pass: the scene minus the selected objects
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("outline_depth_prepass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth_full,
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
            for &(offset, geom) in &depth_draws {
                let pipeline = match geom.category {
                    DrawCategory::Mesh => &self.pipelines.depth_mesh,
                    DrawCategory::Lines => &self.pipelines.depth_lines,
                    DrawCategory::Points => &self.pipelines.depth_points,
                };
                pass.set_pipeline(pipeline);
                pass.set_bind_group(1, &self.draw_bg, &[offset]);
                draw_geom(&mut pass, geom);
            }
        }

        // 2. mask accumulation: one target, groups drawn in plan order,
        //    write masks routing channel membership into b/a
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("outline_mask"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.mask_color,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 1.0,
                            g: 1.0,
                            b: 0.0,
                            a: 0.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.mask_depth,
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
            pass.set_bind_group(2, &self.binds.depth_tex, &[]);
            for &(offset, geom, channel) in &mask_draws {
                let cat = match geom.category {
                    DrawCategory::Mesh => 0,
                    DrawCategory::Lines => 1,
                    DrawCategory::Points => 2,
                };
                let ch = match channel {
                    ChannelKind::Select => 0,
                    ChannelKind::Highlight => 1,
                };
                pass.set_pipeline(&self.pipelines.mask[cat][ch]);
                pass.set_bind_group(1, &self.draw_bg, &[offset]);
                draw_geom(&mut pass, geom);
            }
        }

        // 3. downsample the mask to half resolution
        self.fullscreen(
            encoder,
            &self.pipelines.downsample,
            &self.binds.src_mask_full,
            SLOT_BLIT,
            &self.targets.mask_half,
            Some(wgpu::Color::WHITE),
        );

        // 4. per-channel edge coloring, additive into one edge buffer
        let has_select = mask_draws.iter().any(|(_, _, c)| *c == ChannelKind::Select);
        let has_highlight = mask_draws
            .iter()
            .any(|(_, _, c)| *c == ChannelKind::Highlight);
        {
            let mut pass = fullscreen_pass(
                encoder,
                "outline_edge",
                &self.targets.edge_half,
                Some(wgpu::Color::BLACK),
            );
            pass.set_pipeline(&self.pipelines.edge);
            if has_select {
                pass.set_bind_group(
                    0,
                    &self.binds.src_mask_half,
                    &[(SLOT_EDGE_SELECT * UNIFORM_STRIDE) as u32],
                );
                pass.draw(0..3, 0..1);
            }
            if has_highlight {
                pass.set_bind_group(
                    0,
                    &self.binds.src_mask_half,
                    &[(SLOT_EDGE_HIGHLIGHT * UNIFORM_STRIDE) as u32],
                );
                pass.draw(0..3, 0..1);
            }
        }

        // 5. thickness blur at half res, then glow blur at quarter res
        self.fullscreen(
            encoder,
            &self.pipelines.blur,
            &self.binds.src_edge_half,
            SLOT_BLUR1_H,
            &self.targets.blur_half,
            Some(wgpu::Color::BLACK),
        );
        self.fullscreen(
            encoder,
            &self.pipelines.blur,
            &self.binds.src_blur_half,
            SLOT_BLUR1_V,
            &self.targets.edge_half,
            Some(wgpu::Color::BLACK),
        );
        self.fullscreen(
            encoder,
            &self.pipelines.blur,
            &self.binds.src_edge_half,
            SLOT_BLUR2_H,
            &self.targets.blur_quarter,
            Some(wgpu::Color::BLACK),
        );
        self.fullscreen(
            encoder,
            &self.pipelines.blur,
            &self.binds.src_blur_quarter,
            SLOT_BLUR2_V,
            &self.targets.edge_quarter,
            Some(wgpu::Color::BLACK),
        );

        // 6. overlay composite over the pre-outline frame
        {
            let mut pass = fullscreen_pass(encoder, "outline_overlay", output, None);
            pass.set_pipeline(&self.pipelines.overlay);
            pass.set_bind_group(
                0,
                &self.binds.src_mask_full,
                &[(SLOT_OVERLAY * UNIFORM_STRIDE) as u32],
            );
            pass.set_bind_group(1, &self.binds.overlay_tex, &[]);
            pass.draw(0..3, 0..1);
        }
    }

    fn fullscreen(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::RenderPipeline,
        bind: &wgpu::BindGroup,
        slot: u64,
        target: &wgpu::TextureView,
        clear: Option<wgpu::Color>,
    ) {
        let mut pass = fullscreen_pass(encoder, "outline_fullscreen", target, clear);
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind, &[(slot * UNIFORM_STRIDE) as u32]);
        pass.draw(0..3, 0..1);
    }

    fn write_post_uniforms(&self, queue: &wgpu::Queue) {
        let ratio = self.params.downsample_ratio.max(1);
        let half = [
            (self.width / ratio).max(1) as f32,
            (self.height / ratio).max(1) as f32,
        ];
        let quarter = [(half[0] / 2.0).max(1.0), (half[1] / 2.0).max(1.0)];
        let slots: [(u64, PostUniforms); 8] = [
            (SLOT_BLIT, PostUniforms::default()),
            (
                SLOT_EDGE_SELECT,
                PostUniforms {
                    visible: SELECT_EDGE.visible,
                    hidden: SELECT_EDGE.hidden,
                    channel: 0.0,
                    ..PostUniforms::default()
                },
            ),
            (
                SLOT_EDGE_HIGHLIGHT,
                PostUniforms {
                    visible: HIGHLIGHT_EDGE.visible,
                    hidden: HIGHLIGHT_EDGE.hidden,
                    channel: 1.0,
                    ..PostUniforms::default()
                },
            ),
            (
                SLOT_BLUR1_H,
                PostUniforms {
                    texel: [1.0 / half[0], 1.0 / half[1]],
                    direction: [1.0, 0.0],
                    kernel: self.params.edge_thickness.max(0.01),
                    ..PostUniforms::default()
                },
            ),
            (
                SLOT_BLUR1_V,
                PostUniforms {
                    texel: [1.0 / half[0], 1.0 / half[1]],
                    direction: [0.0, 1.0],
                    kernel: self.params.edge_thickness.max(0.01),
                    ..PostUniforms::default()
                },
            ),
            (
                SLOT_BLUR2_H,
                PostUniforms {
                    texel: [1.0 / quarter[0], 1.0 / quarter[1]],
                    direction: [1.0, 0.0],
                    kernel: GLOW_KERNEL,
                    ..PostUniforms::default()
                },
            ),
            (
                SLOT_BLUR2_V,
                PostUniforms {
                    texel: [1.0 / quarter[0], 1.0 / quarter[1]],
                    direction: [0.0, 1.0],
                    kernel: GLOW_KERNEL,
                    ..PostUniforms::default()
                },
            ),
            (
                SLOT_OVERLAY,
                PostUniforms {
                    edge_strength: self.params.edge_strength,
                    edge_glow: self.params.edge_glow,
                    ..PostUniforms::default()
                },
            ),
        ];
        for (slot, u) in slots {
            queue.write_buffer(&self.post_buf, slot * UNIFORM_STRIDE, bytemuck::bytes_of(&u));
        }
    }

    fn ensure_draw_capacity(&mut self, device: &wgpu::Device, draws: u64) {
        if draws <= self.draw_capacity {
            return;
        }
        let mut capacity = self.draw_capacity;
        while capacity < draws {
            capacity *= 2;
        }
        let (buf, bg) = create_draw_buffer(device, &self.draw_layout, capacity);
        self.draw_buf = buf;
        self.draw_bg = bg;
        self.draw_capacity = capacity;
    }
}

// Helpers ------------------------------------------------------------

fn slot_offset(index: usize) -> u32 {
    (index as u64 * UNIFORM_STRIDE) as u32
}

fn draw_uniforms(geom: &GpuGeom) -> DrawUniforms {
    DrawUniforms {
        model: geom.model,
        color: geom.color,
        point_size: geom.point_size,
        shader_kind: match geom.shader {
            PointShader::Flat => 0.0,
            PointShader::Sprite => 1.0,
        },
        _pad: [0.0; 2],
    }
}

fn draw_geom<'a>(pass: &mut wgpu::RenderPass<'a>, geom: &'a GpuGeom) {
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

fn fullscreen_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &'static str,
    target: &'e wgpu::TextureView,
    clear: Option<wgpu::Color>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

fn uniform_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    dynamic: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn create_draw_buffer(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    capacity: u64,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buf = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("outline_draw_uniforms"),
        size: capacity * UNIFORM_STRIDE,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("outline_draw_bg"),
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

fn create_target(
    device: &wgpu::Device,
    label: &'static str,
    format: wgpu::TextureFormat,
    w: u32,
    h: u32,
    extra_usage: wgpu::TextureUsages,
) -> wgpu::TextureView {
    let tex = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: w.max(1),
            height: h.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | extra_usage,
        view_formats: &[],
    });
    tex.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_targets(device: &wgpu::Device, w: u32, h: u32, ratio: u32) -> Targets {
    let ratio = ratio.max(1);
    let (hw, hh) = ((w / ratio).max(1), (h / ratio).max(1));
    let (qw, qh) = ((hw / 2).max(1), (hh / 2).max(1));
    let sampled = wgpu::TextureUsages::TEXTURE_BINDING;
    Targets {
        scene_color: create_target(device, "outline_scene_color", SCENE_FORMAT, w, h, sampled),
        depth_full: create_target(device, "outline_depth_full", DEPTH_FORMAT, w, h, sampled),
        mask_color: create_target(device, "outline_mask", MASK_FORMAT, w, h, sampled),
        mask_depth: create_target(
            device,
            "outline_mask_depth",
            DEPTH_FORMAT,
            w,
            h,
            wgpu::TextureUsages::empty(),
        ),
        mask_half: create_target(device, "outline_mask_half", MASK_FORMAT, hw, hh, sampled),
        edge_half: create_target(device, "outline_edge_half", MASK_FORMAT, hw, hh, sampled),
        blur_half: create_target(device, "outline_blur_half", MASK_FORMAT, hw, hh, sampled),
        edge_quarter: create_target(device, "outline_edge_quarter", MASK_FORMAT, qw, qh, sampled),
        blur_quarter: create_target(device, "outline_blur_quarter", MASK_FORMAT, qw, qh, sampled),
    }
}

fn post_bind(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buf: &wgpu::Buffer,
    src: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("outline_post_bg"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: buf,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<PostUniforms>() as u64),
                }),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(src),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn create_frame_binds(
    device: &wgpu::Device,
    targets: &Targets,
    depth_tex_layout: &wgpu::BindGroupLayout,
    post_layout: &wgpu::BindGroupLayout,
    overlay_tex_layout: &wgpu::BindGroupLayout,
    post_buf: &wgpu::Buffer,
    sampler: &wgpu::Sampler,
) -> FrameBindGroups {
    FrameBindGroups {
        depth_tex: device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("outline_depth_tex_bg"),
            layout: depth_tex_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&targets.depth_full),
            }],
        }),
        src_scene: post_bind(device, post_layout, post_buf, &targets.scene_color, sampler),
        src_mask_full: post_bind(device, post_layout, post_buf, &targets.mask_color, sampler),
        src_mask_half: post_bind(device, post_layout, post_buf, &targets.mask_half, sampler),
        src_edge_half: post_bind(device, post_layout, post_buf, &targets.edge_half, sampler),
        src_blur_half: post_bind(device, post_layout, post_buf, &targets.blur_half, sampler),
        src_blur_quarter: post_bind(
            device,
            post_layout,
            post_buf,
            &targets.blur_quarter,
            sampler,
        ),
        overlay_tex: device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("outline_overlay_tex_bg"),
            layout: overlay_tex_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&targets.edge_half),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&targets.edge_quarter),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&targets.scene_color),
                },
            ],
        }),
    }
}

fn mesh_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<MeshVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRS,
    }
}

fn point_instance_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<PointInstance>() as u64,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &ATTRS,
    }
}

fn depth_state(write: bool) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: wgpu::CompareFunction::Less,
        stencil: Default::default(),
        bias: Default::default(),
    }
}

const ADDITIVE: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

#[allow(clippy::too_many_arguments)]
fn create_pipelines(
    device: &wgpu::Device,
    shader_mask: &wgpu::ShaderModule,
    shader_post: &wgpu::ShaderModule,
    globals_layout: &wgpu::BindGroupLayout,
    draw_layout: &wgpu::BindGroupLayout,
    depth_tex_layout: &wgpu::BindGroupLayout,
    post_layout: &wgpu::BindGroupLayout,
    overlay_tex_layout: &wgpu::BindGroupLayout,
    output_format: wgpu::TextureFormat,
) -> Pipelines {
    let depth_pl = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("outline_depth_pl"),
        bind_group_layouts: &[globals_layout, draw_layout],
        push_constant_ranges: &[],
    });
    let mask_pl = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("outline_mask_pl"),
        bind_group_layouts: &[globals_layout, draw_layout, depth_tex_layout],
        push_constant_ranges: &[],
    });
    let post_pl = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("outline_post_pl"),
        bind_group_layouts: &[post_layout],
        push_constant_ranges: &[],
    });
    let overlay_pl = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("outline_overlay_pl"),
        bind_group_layouts: &[post_layout, overlay_tex_layout],
        push_constant_ranges: &[],
    });

    let geometry = |entry: &'static str,
                    topology: wgpu::PrimitiveTopology,
                    layout: &wgpu::PipelineLayout,
                    buffers: &[wgpu::VertexBufferLayout<'static>],
                    mask_writes: Option<wgpu::ColorWrites>| {
        let targets = mask_writes.map(|writes| {
            [Some(wgpu::ColorTargetState {
                format: MASK_FORMAT,
                blend: None,
                write_mask: writes,
            })]
        });
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("outline_geometry_pipeline"),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader_mask,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                buffers,
            },
            fragment: targets.as_ref().map(|t| wgpu::FragmentState {
                module: shader_mask,
                entry_point: Some("fs_mask"),
                compilation_options: Default::default(),
                targets: t,
            }),
            primitive: wgpu::PrimitiveState {
                topology,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(depth_state(true)),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        })
    };

    // channel membership rides in b (select) or a (highlight)
    let select_writes = wgpu::ColorWrites::RED | wgpu::ColorWrites::GREEN | wgpu::ColorWrites::BLUE;
    let highlight_writes =
        wgpu::ColorWrites::RED | wgpu::ColorWrites::GREEN | wgpu::ColorWrites::ALPHA;

    let mask_for = |entry: &'static str,
                    topology: wgpu::PrimitiveTopology,
                    buffers: &[wgpu::VertexBufferLayout<'static>]| {
        [
            geometry(entry, topology, &mask_pl, buffers, Some(select_writes)),
            geometry(entry, topology, &mask_pl, buffers, Some(highlight_writes)),
        ]
    };

    let fullscreen = |fs: &'static str,
                      layout: &wgpu::PipelineLayout,
                      format: wgpu::TextureFormat,
                      blend: Option<wgpu::BlendState>| {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("outline_post_pipeline"),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader_post,
                entry_point: Some("vs_fullscreen"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: shader_post,
                entry_point: Some(fs),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: Default::default(),
            multiview: None,
            cache: None,
        })
    };

    Pipelines {
        depth_mesh: geometry(
            "vs_mesh",
            wgpu::PrimitiveTopology::TriangleList,
            &depth_pl,
            &[mesh_vertex_layout()],
            None,
        ),
        depth_lines: geometry(
            "vs_mesh",
            wgpu::PrimitiveTopology::LineList,
            &depth_pl,
            &[mesh_vertex_layout()],
            None,
        ),
        depth_points: geometry(
            "vs_point",
            wgpu::PrimitiveTopology::TriangleStrip,
            &depth_pl,
            &[point_instance_layout()],
            None,
        ),
        mask: [
            mask_for(
                "vs_mesh",
                wgpu::PrimitiveTopology::TriangleList,
                &[mesh_vertex_layout()],
            ),
            mask_for(
                "vs_mesh",
                wgpu::PrimitiveTopology::LineList,
                &[mesh_vertex_layout()],
            ),
            mask_for(
                "vs_point",
                wgpu::PrimitiveTopology::TriangleStrip,
                &[point_instance_layout()],
            ),
        ],
        downsample: fullscreen("fs_copy", &post_pl, MASK_FORMAT, None),
        blit: fullscreen("fs_copy", &post_pl, output_format, None),
        edge: fullscreen("fs_edge", &post_pl, MASK_FORMAT, Some(ADDITIVE)),
        blur: fullscreen("fs_blur", &post_pl, MASK_FORMAT, None),
        overlay: fullscreen("fs_overlay", &overlay_pl, output_format, None),
    }
}
