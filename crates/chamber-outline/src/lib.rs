// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Outline compositing for the chamber event display.
//!
//! [`OutlineRegistry`] is the pure half: the per-(element, channel)
//! registration map, the highlight-suppression rule, and the signature
//! grouping that turns registrations into a per-frame plan. The
//! [`OutlineCompositor`] is the GPU half: it owns every render target and
//! pipeline of the mask/edge/blur/overlay chain and never mutates the
//! underlying scene's draw state.

mod compositor;
mod geom;
mod registry;

pub use compositor::{
    Globals, GpuMaskGroup, OutlineCompositor, OutlineFrame, SceneDraw, SCENE_FORMAT,
};
pub use geom::{upload_part, DrawCategory, GpuGeom, MeshVertex, PointInstance};
pub use registry::{
    EdgeColors, FramePlan, OutlineParams, OutlineRegistry, PlanGroup, PlanItem, HIGHLIGHT_EDGE,
    SELECT_EDGE,
};
