// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! chamber viewer: mirrors a server-pushed event display and outlines the
//! server-confirmed selection.

mod app;
mod camera;
mod gpu;
mod hud;
mod pick;
mod prefs;
mod session;

use std::sync::Arc;

use anyhow::Result;
use chamber_outline::{Globals, OutlineCompositor, OutlineFrame, OutlineParams};
use egui_winit::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};
use glam::{Quat, Vec2, Vec3};
use tracing::{info, warn};

use crate::app::App;
use crate::camera::{Camera, Projection};
use crate::gpu::{Gpu, SceneGlobals};
use crate::hud::HudState;
use crate::prefs::{ViewerPrefs, DEFAULT_SOCK};
use crate::session::SessionClient;

const LIGHT_DIR: [f32; 3] = [0.35, -0.55, -0.76];

struct Active {
    window: Arc<Window>,
    gpu: Gpu,
    compositor: OutlineCompositor,
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
    app: App,
    camera: Camera,
    hud: HudState,
    cursor: Option<Vec2>,
    rotating: bool,
    ctrl_held: bool,
}

struct Viewer {
    prefs: ViewerPrefs,
    active: Option<Active>,
}

impl Viewer {
    fn new(prefs: ViewerPrefs) -> Self {
        Self {
            prefs,
            active: None,
        }
    }

    fn apply_prefs(&self, camera: &mut Camera, hud: &mut HudState) {
        let cam = &self.prefs.camera;
        let q = Quat::from_xyzw(
            cam.orientation[0],
            cam.orientation[1],
            cam.orientation[2],
            cam.orientation[3],
        );
        if q.is_finite() && q.length_squared() > 0.0 {
            camera.orientation = q.normalize();
        }
        if cam.pos.iter().all(|p| p.is_finite()) {
            camera.pos = Vec3::from_array(cam.pos);
        }
        if cam.pitch.is_finite() {
            camera.pitch = cam.pitch.clamp(-camera::MAX_PITCH, camera::MAX_PITCH);
        }
        if cam.fov_y.is_finite() {
            camera.fov_y = cam.fov_y.clamp(15f32.to_radians(), 120f32.to_radians());
        }
        camera.projection = if cam.orthographic {
            Projection::Orthographic
        } else {
            Projection::Perspective
        };
        hud.projection = camera.projection;
        hud.visible = self.prefs.show_hud;
        hud.params = OutlineParams {
            edge_strength: self.prefs.outline.edge_strength,
            edge_glow: self.prefs.outline.edge_glow,
            edge_thickness: self.prefs.outline.edge_thickness,
            downsample_ratio: self.prefs.outline.downsample_ratio.max(1),
        };
    }

    fn export_prefs(&mut self) {
        let Some(active) = &self.active else {
            return;
        };
        let cam = &active.camera;
        self.prefs.camera = prefs::CameraPrefs {
            pos: cam.pos.to_array(),
            orientation: cam.orientation.to_array(),
            pitch: cam.pitch,
            fov_y: cam.fov_y,
            orthographic: cam.projection == Projection::Orthographic,
        };
        let p = active.hud.params;
        self.prefs.outline = prefs::OutlinePrefs {
            edge_strength: p.edge_strength,
            edge_glow: p.edge_glow,
            edge_thickness: p.edge_thickness,
            downsample_ratio: p.downsample_ratio,
        };
        self.prefs.show_hud = active.hud.visible;
    }
}

impl Active {
    fn pick_at(&self, cursor: Vec2) -> Option<pick::PickResult> {
        let w = self.gpu.config.width as f32;
        let h = self.gpu.config.height as f32;
        let ndc = Vec2::new(cursor.x / w * 2.0 - 1.0, 1.0 - cursor.y / h * 2.0);
        let (origin, dir) = self.camera.pick_ray(ndc, w / h.max(1.0));
        let tol = self.camera.pos.length().max(10.0) * 0.01;
        pick::pick(&self.app.scenes, origin, dir, tol)
    }

    fn frame(&mut self) {
        self.app.pump();

        let surface_tex = match self.gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = self.window.inner_size();
                self.gpu.resize(size);
                self.compositor
                    .resize(&self.gpu.device, size.width, size.height);
                return;
            }
            Err(err) => {
                warn!(%err, "surface acquire failed");
                return;
            }
        };
        let surface_view = surface_tex
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.app.ensure_uploaded(&self.gpu.device);
        let plan = self.app.frame_plan();
        let draws = self.app.scene_draws(plan.as_ref());
        let uploads = plan
            .as_ref()
            .map(|p| self.app.upload_plan(&self.gpu.device, p))
            .unwrap_or_default();
        let groups = plan
            .as_ref()
            .map(|p| self.app.mask_groups(p, &uploads))
            .unwrap_or_default();

        let w = self.gpu.config.width as f32;
        let h = self.gpu.config.height.max(1) as f32;
        let view_proj = self.camera.view_proj(w / h).to_cols_array_2d();

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("chamber_frame"),
            });

        let base: Vec<&chamber_outline::GpuGeom> = draws.iter().map(|d| d.geom).collect();
        let scene_globals = SceneGlobals {
            view_proj,
            light_dir: LIGHT_DIR,
            _pad: 0.0,
            viewport: [w, h],
            _pad2: [0.0; 2],
        };
        self.gpu.render_scene(
            &mut encoder,
            self.compositor.scene_view(),
            &scene_globals,
            &base,
        );

        let outline_frame = OutlineFrame {
            globals: Globals {
                view_proj,
                viewport: [w, h],
                cam_near: self.camera.near,
                cam_far: self.camera.far,
            },
            scene: &draws,
            groups: &groups,
        };
        self.compositor.render(
            &self.gpu.device,
            &self.gpu.queue,
            &mut encoder,
            &outline_frame,
            &surface_view,
        );

        self.draw_hud(&mut encoder, &surface_view);

        self.gpu.queue.submit(Some(encoder.finish()));
        surface_tex.present();
    }

    fn draw_hud(&mut self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
        let raw_input = self.egui_state.take_egui_input(&self.window);
        let app = &self.app;
        let hud_state = &mut self.hud;
        let output = self.egui_ctx.run(raw_input, |ctx| {
            hud::draw(ctx, app, hud_state);
        });
        self.egui_state
            .handle_platform_output(&self.window, output.platform_output);
        self.compositor.set_params(self.hud.params);
        self.camera.projection = self.hud.projection;

        let pixels_per_point = self.egui_ctx.pixels_per_point();
        let clipped = self.egui_ctx.tessellate(output.shapes, pixels_per_point);
        let screen = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.gpu.config.width, self.gpu.config.height],
            pixels_per_point,
        };
        for (id, delta) in &output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.gpu.device, &self.gpu.queue, *id, delta);
        }
        self.egui_renderer.update_buffers(
            &self.gpu.device,
            &self.gpu.queue,
            encoder,
            &clipped,
            &screen,
        );
        {
            let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("hud_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.egui_renderer
                .render(&mut pass.forget_lifetime(), &clipped, &screen);
        }
        for id in &output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.active.is_some() {
            return;
        }
        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title("chamber")
                        .with_inner_size(PhysicalSize::new(1280, 800)),
                )
                .expect("window"),
        );
        let gpu = pollster::block_on(Gpu::new(window.clone())).expect("gpu");

        let mut camera = Camera::default();
        let mut hud = HudState {
            visible: true,
            params: OutlineParams::default(),
            projection: Projection::Perspective,
        };
        self.apply_prefs(&mut camera, &mut hud);

        let compositor = OutlineCompositor::new(
            &gpu.device,
            gpu.config.format,
            gpu.config.width,
            gpu.config.height,
            hud.params,
        );

        let socket = self
            .prefs
            .socket_path
            .clone()
            .unwrap_or_else(|| DEFAULT_SOCK.to_owned());
        let app = App::new(SessionClient::connect(&socket));

        let egui_ctx = egui::Context::default();
        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            None,
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(
            &gpu.device,
            gpu.config.format,
            egui_wgpu::RendererOptions {
                msaa_samples: 1,
                depth_stencil_format: None,
                dithering: false,
                predictable_texture_filtering: false,
            },
        );

        self.active = Some(Active {
            window,
            gpu,
            compositor,
            egui_ctx,
            egui_state,
            egui_renderer,
            app,
            camera,
            hud,
            cursor: None,
            rotating: false,
            ctrl_held: false,
        });
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(active) = &mut self.active else {
            return;
        };
        let response = active.egui_state.on_window_event(&active.window, &event);
        if response.repaint {
            active.window.request_redraw();
        }

        match event {
            WindowEvent::CloseRequested => {
                self.export_prefs();
                prefs::save(&self.prefs);
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                active.gpu.resize(size);
                active
                    .compositor
                    .resize(&active.gpu.device, size.width, size.height);
            }
            WindowEvent::ModifiersChanged(mods) => {
                active.ctrl_held = mods.state().control_key();
            }
            WindowEvent::CursorMoved { position, .. } => {
                if response.consumed {
                    return;
                }
                let pos = Vec2::new(position.x as f32, position.y as f32);
                if active.rotating {
                    if let Some(prev) = active.cursor {
                        active.camera.rotate_by_mouse(pos - prev);
                    }
                } else {
                    let hit = active.pick_at(pos);
                    active.app.pointer_moved(hit);
                }
                active.cursor = Some(pos);
            }
            WindowEvent::CursorLeft { .. } => {
                active.cursor = None;
                active.app.pointer_moved(None);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if response.consumed {
                    return;
                }
                match button {
                    MouseButton::Right => {
                        active.rotating = state == ElementState::Pressed;
                    }
                    MouseButton::Left => {
                        if state == ElementState::Pressed {
                            let hit = active.cursor.and_then(|c| active.pick_at(c));
                            let multi = active.ctrl_held;
                            active.app.pointer_clicked(hit, multi);
                        }
                    }
                    _ => {}
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                if response.consumed {
                    return;
                }
                let amount = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y * 20.0,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 * 0.25,
                };
                active.camera.move_relative(Vec3::new(0.0, 0.0, amount));
            }
            WindowEvent::RedrawRequested => {
                active.frame();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(active) = &self.active {
            active.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,wgpu_core=warn,wgpu_hal=warn".into()),
        )
        .init();

    let prefs = prefs::load();
    info!(socket = ?prefs.socket_path, "starting chamber viewer");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut viewer = Viewer::new(prefs);
    event_loop.run_app(&mut viewer)?;
    Ok(())
}
