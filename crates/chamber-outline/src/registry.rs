// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Registration map and grouping for the outline passes. Pure data; the GPU
//! work lives in the compositor.

use chamber_elements::ElementId;
use chamber_scene::{ChannelKind, GeomPart, OutlineSink, RenderSignature};
use indexmap::IndexMap;
use tracing::debug;

/// Per-channel edge colors (visible edge / occluded edge).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeColors {
    pub visible: [f32; 3],
    pub hidden: [f32; 3],
}

/// Confirmed-selection edges: red, ember when occluded.
pub const SELECT_EDGE: EdgeColors = EdgeColors {
    visible: [1.0, 0.0, 0.0],
    hidden: [0.1, 0.04, 0.02],
};

/// Hover-highlight edges: blue, same ember when occluded.
pub const HIGHLIGHT_EDGE: EdgeColors = EdgeColors {
    visible: [0.0, 0.0, 1.0],
    hidden: [0.1, 0.04, 0.02],
};

/// Global outline tunables, applied uniformly to all groups.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutlineParams {
    pub edge_strength: f32,
    pub edge_glow: f32,
    pub edge_thickness: f32,
    /// Mask downsample divisor for the blur chain.
    pub downsample_ratio: u32,
}

impl Default for OutlineParams {
    fn default() -> Self {
        Self {
            edge_strength: 3.0,
            edge_glow: 0.0,
            edge_thickness: 1.0,
            downsample_ratio: 2,
        }
    }
}

#[derive(Clone, Debug)]
struct Registration {
    sec_sel: bool,
    parts: Vec<GeomPart>,
}

/// One draw of the mask pass: geometry plus the channel whose membership it
/// writes.
#[derive(Clone, Debug)]
pub struct PlanItem {
    pub element: ElementId,
    pub channel: ChannelKind,
    /// Derived sub-primitive geometry; lives only for this frame's passes.
    pub sec_sel: bool,
    pub part: GeomPart,
}

/// Mask draws sharing one rendering signature (one uniform setup).
#[derive(Clone, Debug)]
pub struct PlanGroup {
    pub signature: RenderSignature,
    pub items: Vec<PlanItem>,
}

/// Everything the compositor needs for one frame's outline passes.
#[derive(Clone, Debug, Default)]
pub struct FramePlan {
    /// Groups in first-seen registration order.
    pub groups: Vec<PlanGroup>,
    /// Elements carrying any registration; hidden during the depth pre-pass.
    pub selected: Vec<ElementId>,
}

/// Insertion-ordered registration map keyed by (element, channel).
///
/// Registrations are additive per element (select and highlight may coexist
/// on one element with different colors), but a whole-object highlight is
/// suppressed while a select registration exists for the same element, so
/// identical full-object selections never double-outline.
#[derive(Debug, Default)]
pub struct OutlineRegistry {
    entries: IndexMap<(ElementId, ChannelKind), Registration>,
}

impl OutlineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Flatten live registrations into mask groups partitioned by rendering
    /// signature, stable in first-seen order. `None` when nothing is
    /// registered; the compositor then degenerates to a straight copy.
    pub fn frame_plan(&self) -> Option<FramePlan> {
        if self.entries.is_empty() {
            return None;
        }
        let mut plan = FramePlan::default();
        for (&(element, channel), reg) in &self.entries {
            if !plan.selected.contains(&element) {
                plan.selected.push(element);
            }
            for part in &reg.parts {
                let sig = part.signature();
                let item = PlanItem {
                    element,
                    channel,
                    sec_sel: reg.sec_sel,
                    part: part.clone(),
                };
                match plan.groups.iter_mut().find(|g| g.signature == sig) {
                    Some(group) => group.items.push(item),
                    None => plan.groups.push(PlanGroup {
                        signature: sig,
                        items: vec![item],
                    }),
                }
            }
        }
        Some(plan)
    }
}

impl OutlineSink for OutlineRegistry {
    fn register(
        &mut self,
        element: ElementId,
        channel: ChannelKind,
        sec_sel: bool,
        parts: Vec<GeomPart>,
    ) {
        if channel == ChannelKind::Highlight
            && !sec_sel
            && self.entries.contains_key(&(element, ChannelKind::Select))
        {
            debug!(element, "highlight suppressed, element already selected");
            return;
        }
        self.entries
            .insert((element, channel), Registration { sec_sel, parts });
    }

    fn unregister(&mut self, element: ElementId, channel: ChannelKind) {
        self.entries.shift_remove(&(element, channel));
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chamber_scene::{PartKind, PointShader};

    fn mesh_part() -> GeomPart {
        GeomPart::new(PartKind::Mesh, vec![[0.0; 3]; 3])
    }

    fn points_part(size: f32, shader: PointShader) -> GeomPart {
        let mut p = GeomPart::new(PartKind::Points, vec![[0.0; 3]; 4]);
        p.point_size = size;
        p.shader = shader;
        p
    }

    #[test]
    fn empty_registry_yields_no_plan() {
        assert!(OutlineRegistry::new().frame_plan().is_none());
    }

    #[test]
    fn register_then_unregister_is_empty() {
        let mut reg = OutlineRegistry::new();
        reg.register(1, ChannelKind::Select, false, vec![mesh_part()]);
        assert_eq!(reg.len(), 1);
        reg.unregister(1, ChannelKind::Select);
        assert!(reg.is_empty());
    }

    #[test]
    fn select_and_highlight_coexist_on_one_element() {
        let mut reg = OutlineRegistry::new();
        reg.register(1, ChannelKind::Highlight, false, vec![mesh_part()]);
        reg.register(1, ChannelKind::Select, false, vec![mesh_part()]);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn whole_object_highlight_suppressed_after_select() {
        let mut reg = OutlineRegistry::new();
        reg.register(1, ChannelKind::Select, false, vec![mesh_part()]);
        reg.register(1, ChannelKind::Highlight, false, vec![mesh_part()]);
        assert_eq!(reg.len(), 1);
        // a secondary highlight is not suppressed
        reg.register(1, ChannelKind::Highlight, true, vec![mesh_part()]);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn grouping_splits_points_by_size_and_shader() {
        let mut reg = OutlineRegistry::new();
        reg.register(1, ChannelKind::Select, false, vec![mesh_part()]);
        reg.register(
            2,
            ChannelKind::Select,
            false,
            vec![points_part(4.0, PointShader::Sprite)],
        );
        reg.register(
            3,
            ChannelKind::Highlight,
            false,
            vec![points_part(4.0, PointShader::Sprite)],
        );
        reg.register(
            4,
            ChannelKind::Select,
            false,
            vec![points_part(8.0, PointShader::Sprite)],
        );
        reg.register(
            5,
            ChannelKind::Select,
            false,
            vec![points_part(4.0, PointShader::Flat)],
        );

        let plan = reg.frame_plan().expect("plan");
        // mesh group, 4px sprite group (two members), 8px sprite, 4px flat
        assert_eq!(plan.groups.len(), 4);
        assert_eq!(plan.groups[1].items.len(), 2);
        assert_eq!(plan.selected, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn grouping_preserves_insertion_order() {
        let mut reg = OutlineRegistry::new();
        reg.register(
            9,
            ChannelKind::Select,
            false,
            vec![points_part(2.0, PointShader::Flat)],
        );
        reg.register(3, ChannelKind::Select, false, vec![mesh_part()]);
        let plan = reg.frame_plan().expect("plan");
        assert_eq!(plan.groups[0].items[0].element, 9);
        assert_eq!(plan.groups[1].items[0].element, 3);
    }

    #[test]
    fn mesh_and_lines_share_a_group() {
        let mut reg = OutlineRegistry::new();
        reg.register(1, ChannelKind::Select, false, vec![mesh_part()]);
        reg.register(
            2,
            ChannelKind::Highlight,
            false,
            vec![GeomPart::new(PartKind::LineSegments, vec![[0.0; 3]; 2])],
        );
        let plan = reg.frame_plan().expect("plan");
        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].items.len(), 2);
    }
}
