// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Renderable primitives: part-based geometry with rendering signatures and
//! secondary-selection derivation.

use std::collections::HashSet;
use std::sync::Arc;

use chamber_elements::ElementId;
use glam::Mat4;

/// Drawable part category. A closed set: dispatch is by tag, not by
/// inheritance chains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PartKind {
    /// Indexed or fan-ordered triangles.
    Mesh,
    /// Independent segments, two vertices each.
    LineSegments,
    /// Point cloud, rendered as camera-facing quads.
    Points,
}

/// Point material program. Grouping in the outline mask pass splits on this
/// because the mask shader is configured once per draw call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PointShader {
    /// Flat square points.
    #[default]
    Flat,
    /// Round sprite points (corner fragments discarded).
    Sprite,
}

/// One drawable chunk of a primitive. Buffers are shared via `Arc` so
/// outline registrations can hold geometry without copying it.
#[derive(Clone, Debug)]
pub struct GeomPart {
    pub kind: PartKind,
    pub positions: Arc<Vec<[f32; 3]>>,
    pub indices: Option<Arc<Vec<u32>>>,
    pub normals: Option<Arc<Vec<[f32; 3]>>>,
    pub color: [f32; 4],
    pub line_width: f32,
    pub point_size: f32,
    pub shader: PointShader,
    pub model: Mat4,
}

impl GeomPart {
    pub fn new(kind: PartKind, positions: Vec<[f32; 3]>) -> Self {
        Self {
            kind,
            positions: Arc::new(positions),
            indices: None,
            normals: None,
            color: [1.0, 1.0, 1.0, 1.0],
            line_width: 1.0,
            point_size: 3.0,
            shader: PointShader::default(),
            model: Mat4::IDENTITY,
        }
    }

    /// Signature used to batch mask-pass draw calls.
    pub fn signature(&self) -> RenderSignature {
        match self.kind {
            PartKind::Mesh | PartKind::LineSegments => RenderSignature {
                category: SignatureCategory::MeshLike,
                point_size_bits: 0,
                shader: PointShader::Flat,
            },
            PartKind::Points => RenderSignature {
                category: SignatureCategory::Points,
                point_size_bits: canonical_f32_bits(self.point_size),
                shader: self.shader,
            },
        }
    }
}

/// Coarse signature category: meshes and line sets batch together, point
/// clouds split further by size and shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignatureCategory {
    MeshLike,
    Points,
}

/// Grouping key for the outline mask pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderSignature {
    pub category: SignatureCategory,
    pub point_size_bits: u32,
    pub shader: PointShader,
}

impl RenderSignature {
    /// Point size recovered from the canonical bit pattern; 0.0 for
    /// mesh-like groups.
    pub fn point_size(&self) -> f32 {
        f32::from_bits(self.point_size_bits)
    }
}

/// Canonical bit pattern for hashing floats: collapses -0.0 into 0.0 and all
/// NaN payloads into the standard quiet NaN.
fn canonical_f32_bits(v: f32) -> u32 {
    if v == 0.0 {
        0.0f32.to_bits()
    } else if v.is_nan() {
        f32::NAN.to_bits()
    } else {
        v.to_bits()
    }
}

/// A renderable primitive derived from one element.
///
/// Owned exclusively by the scene-sync map that created it; never shared
/// across scenes. `visible` obeys
/// `element.rnr_self && ancestor_visible` at all times.
#[derive(Clone, Debug)]
pub struct Primitive {
    pub element_id: ElementId,
    pub master_id: Option<ElementId>,
    pub name: String,
    pub visible: bool,
    pub ancestor_visible: bool,
    pub parts: Vec<GeomPart>,
    /// Line sets: logical line id per segment, then per marker. Lets
    /// secondary selection pull the markers riding on a selected segment.
    pub(crate) seg_map: Option<Arc<Vec<u32>>>,
}

impl Primitive {
    pub fn new(
        element_id: ElementId,
        master_id: Option<ElementId>,
        name: String,
        parts: Vec<GeomPart>,
    ) -> Self {
        Self {
            element_id,
            master_id,
            name,
            visible: true,
            ancestor_visible: true,
            parts,
            seg_map: None,
        }
    }

    /// Build derived geometry restricted to the given sub-primitive indices.
    ///
    /// Returns `None` when the primitive has no secondary-selection notion
    /// (plain meshes) or the indices do not survive bounds checks; the
    /// registration is then skipped, siblings unaffected.
    pub fn secondary_parts(&self, idcs: &[u32]) -> Option<Vec<GeomPart>> {
        if idcs.is_empty() {
            return None;
        }
        let first = self.parts.first()?;
        match first.kind {
            PartKind::Points => Self::pick_points(first, idcs).map(|p| vec![p]),
            PartKind::LineSegments => self.pick_segments(first, idcs),
            PartKind::Mesh => None,
        }
    }

    fn pick_points(part: &GeomPart, idcs: &[u32]) -> Option<GeomPart> {
        let picked: Vec<[f32; 3]> = idcs
            .iter()
            .filter_map(|&i| part.positions.get(i as usize).copied())
            .collect();
        if picked.is_empty() {
            return None;
        }
        let mut derived = part.clone();
        derived.positions = Arc::new(picked);
        derived.indices = None;
        Some(derived)
    }

    fn pick_segments(&self, part: &GeomPart, idcs: &[u32]) -> Option<Vec<GeomPart>> {
        let mut seg_points = Vec::new();
        let mut picked_lines = HashSet::new();
        let n_seg = part.positions.len() / 2;
        for &i in idcs {
            let i = i as usize;
            if i >= n_seg {
                continue;
            }
            seg_points.push(part.positions[2 * i]);
            seg_points.push(part.positions[2 * i + 1]);
            if let Some(map) = &self.seg_map {
                if let Some(&line) = map.get(i) {
                    picked_lines.insert(line);
                }
            }
        }
        if seg_points.is_empty() {
            return None;
        }
        let mut derived = part.clone();
        derived.positions = Arc::new(seg_points);
        derived.indices = None;
        let mut out = vec![derived];

        // markers that belong to the picked lines
        if let (Some(map), Some(markers)) = (
            &self.seg_map,
            self.parts.iter().find(|p| p.kind == PartKind::Points),
        ) {
            let picked: Vec<[f32; 3]> = markers
                .positions
                .iter()
                .enumerate()
                .filter(|(k, _)| {
                    map.get(n_seg + k)
                        .is_some_and(|line| picked_lines.contains(line))
                })
                .map(|(_, p)| *p)
                .collect();
            if !picked.is_empty() {
                let mut mpart = markers.clone();
                mpart.positions = Arc::new(picked);
                out.push(mpart);
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_set() -> Primitive {
        // two segments on line 0, one segment on line 1, three markers
        let segs = GeomPart::new(
            PartKind::LineSegments,
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [2.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [1.0, 1.0, 0.0],
            ],
        );
        let mut markers = GeomPart::new(
            PartKind::Points,
            vec![[0.5, 0.0, 0.0], [1.5, 0.0, 0.0], [0.5, 1.0, 0.0]],
        );
        markers.point_size = 5.0;
        let mut prim = Primitive::new(7, None, "lines".to_owned(), vec![segs, markers]);
        prim.seg_map = Some(Arc::new(vec![0, 0, 1, 0, 0, 1]));
        prim
    }

    #[test]
    fn signatures_batch_meshlike_and_split_points() {
        let mesh = GeomPart::new(PartKind::Mesh, vec![[0.0; 3]; 3]);
        let lines = GeomPart::new(PartKind::LineSegments, vec![[0.0; 3]; 2]);
        assert_eq!(mesh.signature(), lines.signature());

        let mut a = GeomPart::new(PartKind::Points, vec![[0.0; 3]]);
        a.point_size = 4.0;
        let mut b = a.clone();
        b.point_size = 8.0;
        let mut c = a.clone();
        c.shader = PointShader::Sprite;
        assert_ne!(a.signature(), b.signature());
        assert_ne!(a.signature(), c.signature());
        assert_eq!(a.signature(), a.clone().signature());
        assert!((a.signature().point_size() - 4.0).abs() < f32::EPSILON);
    }

    #[test]
    fn secondary_segments_bring_their_markers() {
        let prim = line_set();
        let parts = prim.secondary_parts(&[2]).expect("derived");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].positions.len(), 2);
        // line 1 owns exactly the third marker
        assert_eq!(parts[1].positions.as_slice(), &[[0.5, 1.0, 0.0]]);
    }

    #[test]
    fn secondary_out_of_range_degenerates() {
        let prim = line_set();
        assert!(prim.secondary_parts(&[99]).is_none());
        assert!(prim.secondary_parts(&[]).is_none());
    }

    #[test]
    fn mesh_has_no_secondary_selection() {
        let prim = Primitive::new(
            1,
            None,
            "mesh".to_owned(),
            vec![GeomPart::new(PartKind::Mesh, vec![[0.0; 3]; 3])],
        );
        assert!(prim.secondary_parts(&[0]).is_none());
    }
}
