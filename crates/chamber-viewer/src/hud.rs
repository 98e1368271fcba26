// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Stateless egui overlay: connection status, scene stats, outline tunables.

use chamber_outline::OutlineParams;
use chamber_scene::{ChannelKind, ChannelState};
use egui::Context;

use crate::app::App;
use crate::camera::Projection;

pub struct HudState {
    pub visible: bool,
    pub params: OutlineParams,
    pub projection: Projection,
}

/// Draw the overlay; returns true when a tunable changed.
pub fn draw(ctx: &Context, app: &App, hud: &mut HudState) -> bool {
    if !hud.visible {
        return false;
    }
    let mut changed = false;
    egui::Window::new("chamber")
        .default_width(240.0)
        .show(ctx, |ui| {
            let status = if app.session.is_connected() {
                "connected"
            } else {
                "disconnected"
            };
            ui.label(format!("session: {status}"));
            ui.label(format!(
                "scenes: {}  primitives: {}",
                app.scenes.len(),
                app.primitive_count()
            ));
            if let Some(ctrl) = &app.controller {
                ui.label(format!(
                    "select: {:?}  highlight: {:?}",
                    ctrl.state(ChannelKind::Select),
                    ctrl.state(ChannelKind::Highlight)
                ));
                let idle = ctrl.state(ChannelKind::Highlight) == ChannelState::Idle;
                if idle {
                    ui.label("hover a primitive to highlight it");
                }
            } else {
                ui.label("waiting for hello");
            }

            ui.separator();
            ui.label("outline");
            changed |= ui
                .add(egui::Slider::new(&mut hud.params.edge_strength, 0.0..=10.0).text("strength"))
                .changed();
            changed |= ui
                .add(egui::Slider::new(&mut hud.params.edge_glow, 0.0..=4.0).text("glow"))
                .changed();
            changed |= ui
                .add(egui::Slider::new(&mut hud.params.edge_thickness, 0.2..=4.0).text("thickness"))
                .changed();

            ui.separator();
            let mut ortho = hud.projection == Projection::Orthographic;
            if ui.checkbox(&mut ortho, "orthographic").changed() {
                hud.projection = if ortho {
                    Projection::Orthographic
                } else {
                    Projection::Perspective
                };
            }
        });
    changed
}
