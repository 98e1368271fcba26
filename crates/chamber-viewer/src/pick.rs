// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! CPU ray casting over the visible primitives, with sub-primitive index
//! extraction: segment index for line sets, point index for point clouds.

use chamber_elements::ElementId;
use chamber_scene::{GeomPart, PartKind, SceneSync};
use glam::Vec3;

#[derive(Clone, Debug, PartialEq)]
pub struct PickResult {
    pub element_id: ElementId,
    pub sec_idx: Option<u32>,
    pub t: f32,
}

/// Nearest hit along the ray across every visible primitive, or `None`.
/// `tol` is the world-space pick radius for lines and points.
pub fn pick(scenes: &[SceneSync], origin: Vec3, dir: Vec3, tol: f32) -> Option<PickResult> {
    let mut best: Option<PickResult> = None;
    for scene in scenes {
        for prim in scene.primitives().filter(|p| p.visible) {
            for part in &prim.parts {
                if let Some((t, sec_idx)) = hit_part(part, origin, dir, tol) {
                    if best.as_ref().is_none_or(|b| t < b.t) {
                        best = Some(PickResult {
                            element_id: prim.element_id,
                            sec_idx,
                            t,
                        });
                    }
                }
            }
        }
    }
    best
}

fn hit_part(part: &GeomPart, origin: Vec3, dir: Vec3, tol: f32) -> Option<(f32, Option<u32>)> {
    match part.kind {
        PartKind::Mesh => hit_mesh(part, origin, dir),
        PartKind::LineSegments => hit_segments(part, origin, dir, tol),
        PartKind::Points => hit_points(part, origin, dir, tol),
    }
}

fn world(part: &GeomPart, i: usize) -> Option<Vec3> {
    part.positions
        .get(i)
        .map(|p| part.model.transform_point3(Vec3::from_array(*p)))
}

fn hit_mesh(part: &GeomPart, origin: Vec3, dir: Vec3) -> Option<(f32, Option<u32>)> {
    let mut best: Option<f32> = None;
    let tri_hit = |a: Vec3, b: Vec3, c: Vec3| ray_triangle(origin, dir, a, b, c);
    match &part.indices {
        Some(idx) => {
            for tri in idx.chunks_exact(3) {
                let (a, b, c) = (
                    world(part, tri[0] as usize)?,
                    world(part, tri[1] as usize)?,
                    world(part, tri[2] as usize)?,
                );
                if let Some(t) = tri_hit(a, b, c) {
                    if best.is_none_or(|bt| t < bt) {
                        best = Some(t);
                    }
                }
            }
        }
        None => {
            for i in (0..part.positions.len().saturating_sub(2)).step_by(3) {
                let (a, b, c) = (world(part, i)?, world(part, i + 1)?, world(part, i + 2)?);
                if let Some(t) = tri_hit(a, b, c) {
                    if best.is_none_or(|bt| t < bt) {
                        best = Some(t);
                    }
                }
            }
        }
    }
    best.map(|t| (t, None))
}

fn hit_segments(
    part: &GeomPart,
    origin: Vec3,
    dir: Vec3,
    tol: f32,
) -> Option<(f32, Option<u32>)> {
    let mut best: Option<(f32, u32)> = None;
    let n_seg = part.positions.len() / 2;
    for seg in 0..n_seg {
        let a = world(part, 2 * seg)?;
        let b = world(part, 2 * seg + 1)?;
        if let Some(t) = ray_segment(origin, dir, a, b, tol) {
            if best.is_none_or(|(bt, _)| t < bt) {
                best = Some((t, seg as u32));
            }
        }
    }
    best.map(|(t, seg)| (t, Some(seg)))
}

fn hit_points(part: &GeomPart, origin: Vec3, dir: Vec3, tol: f32) -> Option<(f32, Option<u32>)> {
    let mut best: Option<(f32, u32)> = None;
    for i in 0..part.positions.len() {
        let p = world(part, i)?;
        let to = p - origin;
        let t = to.dot(dir);
        if t <= 0.0 {
            continue;
        }
        let closest = origin + dir * t;
        if (closest - p).length() <= tol && best.is_none_or(|(bt, _)| t < bt) {
            best = Some((t, i as u32));
        }
    }
    best.map(|(t, i)| (t, Some(i)))
}

/// Möller–Trumbore.
fn ray_triangle(origin: Vec3, dir: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    let e1 = b - a;
    let e2 = c - a;
    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < 1e-8 {
        return None;
    }
    let inv = 1.0 / det;
    let s = origin - a;
    let u = s.dot(p) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = dir.dot(q) * inv;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv;
    (t > 1e-6).then_some(t)
}

/// Distance test between a ray and a segment; returns the ray parameter of
/// the closest approach when within `tol`.
fn ray_segment(origin: Vec3, dir: Vec3, a: Vec3, b: Vec3, tol: f32) -> Option<f32> {
    let u = b - a;
    let v = dir;
    let w = a - origin;
    let uu = u.dot(u);
    if uu < 1e-12 {
        return None;
    }
    let uv = u.dot(v);
    let uw = u.dot(w);
    let vw = v.dot(w);
    let denom = uu - uv * uv;
    let (s, t) = if denom.abs() < 1e-8 {
        // near-parallel: clamp to segment start
        (0.0, vw)
    } else {
        let s = ((uv * vw - uw) / denom).clamp(0.0, 1.0);
        (s, vw + s * uv)
    };
    if t <= 0.0 {
        return None;
    }
    let on_seg = a + u * s;
    let on_ray = origin + v * t;
    ((on_seg - on_ray).length() <= tol).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chamber_elements::{ElementNode, ElementStore, RenderData};
    use chamber_scene::StandardFactory;

    fn scene_of(nodes: Vec<ElementNode>) -> SceneSync {
        let mut store = ElementStore::new();
        let root = ElementNode {
            children: nodes,
            ..ElementNode::leaf(1, "root", None)
        };
        store.apply_scene_created(1, root).expect("create");
        let mut sync = chamber_scene::SceneSync::new(1);
        sync.rebuild_all(&store, &StandardFactory);
        sync
    }

    #[test]
    fn picks_nearest_point_with_index() {
        let sync = scene_of(vec![ElementNode::leaf(
            2,
            "hits",
            Some(RenderData {
                builder: "Hit".to_owned(),
                positions: vec![0.0, 0.0, -10.0, 0.0, 0.0, -5.0],
                ..RenderData::default()
            }),
        )]);
        let hit = pick(
            std::slice::from_ref(&sync),
            glam::Vec3::ZERO,
            glam::Vec3::NEG_Z,
            0.5,
        )
        .expect("hit");
        assert_eq!(hit.element_id, 2);
        assert_eq!(hit.sec_idx, Some(1)); // the nearer point
    }

    #[test]
    fn picks_segment_index() {
        let sync = scene_of(vec![ElementNode::leaf(
            2,
            "track",
            Some(RenderData {
                builder: "Track".to_owned(),
                positions: vec![
                    -1.0, 0.0, -5.0, //
                    1.0, 0.0, -5.0, //
                    1.0, 2.0, -5.0,
                ],
                ..RenderData::default()
            }),
        )]);
        // aim at the second segment
        let hit = pick(
            std::slice::from_ref(&sync),
            glam::Vec3::new(1.0, 1.0, 0.0),
            glam::Vec3::NEG_Z,
            0.25,
        )
        .expect("hit");
        assert_eq!(hit.sec_idx, Some(1));
    }

    #[test]
    fn invisible_primitives_are_not_pickable() {
        let sync = scene_of(vec![ElementNode {
            rnr_self: false,
            ..ElementNode::leaf(
                2,
                "hits",
                Some(RenderData {
                    builder: "Hit".to_owned(),
                    positions: vec![0.0, 0.0, -5.0],
                    ..RenderData::default()
                }),
            )
        }]);
        assert!(pick(
            std::slice::from_ref(&sync),
            glam::Vec3::ZERO,
            glam::Vec3::NEG_Z,
            0.5
        )
        .is_none());
    }
}
