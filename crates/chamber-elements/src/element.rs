// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Core element types shared between the store and the wire schema.

use serde::{Deserialize, Serialize};

/// Server-assigned element identifier. Id 0 is reserved ("clear" target in
/// invocation requests) and never names a real element.
pub type ElementId = u64;
/// Identifier of the scene subtree an element belongs to.
pub type SceneId = u64;
/// Identifier of a selection channel (select or highlight).
pub type ChannelId = u64;

/// Change-bit set carried by element-changed messages.
///
/// Bits mirror the categories the server reports: the two observable halves
/// of a visibility change, object-property changes, and color/selection
/// changes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeBits(u8);

impl ChangeBits {
    /// The element's own render flag changed.
    pub const RNR_SELF: ChangeBits = ChangeBits(1);
    /// The element's render-children flag changed.
    pub const RNR_CHILDREN: ChangeBits = ChangeBits(1 << 1);
    /// An object property changed (geometry must be rebuilt).
    pub const PROP: ChangeBits = ChangeBits(1 << 2);
    /// Color or selection-related state changed (geometry must be rebuilt).
    pub const COLOR_SELECTION: ChangeBits = ChangeBits(1 << 3);

    /// True when every bit of `other` is set in `self`.
    pub fn contains(self, other: ChangeBits) -> bool {
        self.0 & other.0 == other.0
    }

    /// Bitwise union of two change sets.
    pub fn union(self, other: ChangeBits) -> ChangeBits {
        ChangeBits(self.0 | other.0)
    }

    /// True when no bits are set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Raw render payload attached to drawable elements.
///
/// `positions` is a flat xyz-triple buffer. For line sets the buffer holds
/// the segment vertices first and the marker points after `marker_offset`;
/// `indices` then maps every segment and marker to a logical line id so
/// secondary selection can pick the markers that ride on a selected segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderData {
    /// Builder kind tag. Open set: unknown kinds must survive decode so the
    /// factory can skip them.
    pub builder: String,
    /// Flat vertex positions, xyz triples.
    pub positions: Vec<f32>,
    /// Optional index buffer; meaning depends on the builder kind.
    pub indices: Option<Vec<u32>>,
    /// Optional flat vertex normals, xyz triples.
    pub normals: Option<Vec<f32>>,
    /// Optional column-major 4x4 model transform.
    pub matrix: Option<[f32; 16]>,
    /// Base RGBA color.
    pub color: [f32; 4],
    /// Line width hint for line builders.
    pub line_width: f32,
    /// Point size hint (pixels) for point builders.
    pub point_size: f32,
    /// For line sets: vertex count of the segment plex; markers follow.
    pub marker_offset: Option<u32>,
}

impl Default for RenderData {
    fn default() -> Self {
        Self {
            builder: String::new(),
            positions: Vec::new(),
            indices: None,
            normals: None,
            matrix: None,
            color: [1.0, 1.0, 1.0, 1.0],
            line_width: 1.0,
            point_size: 3.0,
            marker_offset: None,
        }
    }
}

/// One element as stored in the arena.
///
/// Parents own their children: removing an element drops its whole subtree
/// from the store.
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    /// Server-assigned identifier.
    pub id: ElementId,
    /// Logical alias shared by elements that highlight as one target
    /// (e.g. projected copies).
    pub master_id: Option<ElementId>,
    /// Display name.
    pub name: String,
    /// Whether the element renders itself.
    pub rnr_self: bool,
    /// Whether descendants may render.
    pub rnr_children: bool,
    /// Owning scene.
    pub scene_id: SceneId,
    /// Render payload, if the element is drawable.
    pub render_data: Option<RenderData>,
    /// Child ids in server order.
    pub children: Vec<ElementId>,
    /// Parent id; `None` for scene roots.
    pub parent: Option<ElementId>,
}

/// Nested element subtree as it travels on the wire.
///
/// The store flattens these into arena [`Element`]s on insertion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    /// Server-assigned identifier.
    pub id: ElementId,
    /// Logical highlight alias, if any.
    pub master_id: Option<ElementId>,
    /// Display name.
    pub name: String,
    /// Whether the element renders itself.
    pub rnr_self: bool,
    /// Whether descendants may render.
    pub rnr_children: bool,
    /// Render payload, if drawable.
    pub render_data: Option<RenderData>,
    /// Child subtrees in server order.
    pub children: Vec<ElementNode>,
}

impl ElementNode {
    /// Leaf node helper used across the test suites.
    pub fn leaf(id: ElementId, name: &str, render_data: Option<RenderData>) -> Self {
        Self {
            id,
            master_id: None,
            name: name.to_owned(),
            rnr_self: true,
            rnr_children: true,
            render_data,
            children: Vec::new(),
        }
    }
}

/// Field patch carried by element-changed messages.
///
/// Which fields apply is governed by the message's [`ChangeBits`]; fields
/// outside the named bits are ignored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementPatch {
    /// New display name, when a property change renames the element.
    pub name: Option<String>,
    /// New render-self flag (applies under [`ChangeBits::RNR_SELF`]).
    pub rnr_self: Option<bool>,
    /// New render-children flag (applies under [`ChangeBits::RNR_CHILDREN`]).
    pub rnr_children: Option<bool>,
    /// Replacement render payload (applies under [`ChangeBits::PROP`] or
    /// [`ChangeBits::COLOR_SELECTION`]).
    pub render_data: Option<RenderData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_bits_contains_and_union() {
        let bits = ChangeBits::RNR_SELF.union(ChangeBits::PROP);
        assert!(bits.contains(ChangeBits::RNR_SELF));
        assert!(bits.contains(ChangeBits::PROP));
        assert!(!bits.contains(ChangeBits::RNR_CHILDREN));
        assert!(!ChangeBits::default().contains(ChangeBits::RNR_SELF));
        assert!(ChangeBits::default().is_empty());
    }
}
