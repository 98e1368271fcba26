// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Element → primitive conversion. Stateless per call; the sync engine
//! decides what to do with skipped builds.

use std::sync::Arc;

use chamber_elements::{Element, RenderData};
use glam::Mat4;

use crate::primitive::{GeomPart, PartKind, PointShader, Primitive};

/// Why a build produced no primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildError {
    /// The builder tag names no known conversion. Logged once per kind.
    UnknownBuilder,
    /// The payload is too degenerate to draw (reason for the log line).
    Degenerate(&'static str),
}

/// Converts one element plus its render payload into a primitive.
pub trait ObjectFactory {
    fn build(&self, elem: &Element, data: &RenderData) -> Result<Primitive, BuildError>;
}

/// The stock builder set: hits, tracks, jets, line sets, plain meshes.
#[derive(Debug, Default)]
pub struct StandardFactory;

impl ObjectFactory for StandardFactory {
    fn build(&self, elem: &Element, data: &RenderData) -> Result<Primitive, BuildError> {
        let parts = match data.builder.as_str() {
            "Hit" => build_hit(data)?,
            "Track" => build_track(data)?,
            "Jet" => build_jet(data)?,
            "StraightLineSet" => return build_line_set(elem, data),
            "Mesh" => build_mesh(data)?,
            _ => return Err(BuildError::UnknownBuilder),
        };
        Ok(finish(elem, data, parts, None))
    }
}

fn finish(
    elem: &Element,
    data: &RenderData,
    mut parts: Vec<GeomPart>,
    seg_map: Option<Arc<Vec<u32>>>,
) -> Primitive {
    let model = data
        .matrix
        .map_or(Mat4::IDENTITY, |m| Mat4::from_cols_array(&m));
    for part in &mut parts {
        part.model = model;
    }
    let mut prim = Primitive::new(elem.id, elem.master_id, elem.name.clone(), parts);
    prim.seg_map = seg_map;
    prim
}

fn triples(data: &RenderData) -> Result<Vec<[f32; 3]>, BuildError> {
    if data.positions.len() % 3 != 0 {
        return Err(BuildError::Degenerate("position buffer not xyz triples"));
    }
    Ok(data
        .positions
        .chunks_exact(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect())
}

fn normals(data: &RenderData) -> Option<Arc<Vec<[f32; 3]>>> {
    let buf = data.normals.as_ref()?;
    if buf.len() != data.positions.len() {
        return None;
    }
    Some(Arc::new(
        buf.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect(),
    ))
}

fn build_hit(data: &RenderData) -> Result<Vec<GeomPart>, BuildError> {
    let points = triples(data)?;
    if points.is_empty() {
        return Err(BuildError::Degenerate("hit set with no points"));
    }
    let mut part = GeomPart::new(PartKind::Points, points);
    part.color = data.color;
    part.point_size = data.point_size;
    part.shader = PointShader::Sprite;
    Ok(vec![part])
}

fn build_track(data: &RenderData) -> Result<Vec<GeomPart>, BuildError> {
    let points = triples(data)?;
    if points.len() < 2 {
        return Err(BuildError::Degenerate("track with fewer than two points"));
    }
    // polyline → independent segments
    let mut segs = Vec::with_capacity((points.len() - 1) * 2);
    for pair in points.windows(2) {
        segs.push(pair[0]);
        segs.push(pair[1]);
    }
    let mut part = GeomPart::new(PartKind::LineSegments, segs);
    part.color = data.color;
    part.line_width = data.line_width;
    Ok(vec![part])
}

fn build_jet(data: &RenderData) -> Result<Vec<GeomPart>, BuildError> {
    let points = triples(data)?;
    if points.len() < 3 {
        return Err(BuildError::Degenerate("jet cone with fewer than three points"));
    }
    let mut part = GeomPart::new(PartKind::Mesh, points);
    part.color = data.color;
    part.normals = normals(data);
    // apex fan over the rim when the server sends no explicit triangles
    part.indices = Some(match &data.indices {
        Some(idx) => Arc::new(idx.clone()),
        None => {
            let rim = u32::try_from(part.positions.len()).unwrap_or(u32::MAX) - 1;
            let mut fan = Vec::with_capacity(rim as usize * 3);
            for i in 1..rim {
                fan.extend_from_slice(&[0, i, i + 1]);
            }
            fan.extend_from_slice(&[0, rim, 1]);
            Arc::new(fan)
        }
    });
    Ok(vec![part])
}

fn build_mesh(data: &RenderData) -> Result<Vec<GeomPart>, BuildError> {
    let points = triples(data)?;
    if points.len() < 3 {
        return Err(BuildError::Degenerate("mesh with fewer than three vertices"));
    }
    let mut part = GeomPart::new(PartKind::Mesh, points);
    part.color = data.color;
    part.normals = normals(data);
    part.indices = data.indices.as_ref().map(|i| Arc::new(i.clone()));
    Ok(vec![part])
}

/// Line sets carry a segment plex followed by a marker plex in one buffer;
/// the index buffer maps both plexes onto logical line ids.
fn build_line_set(elem: &Element, data: &RenderData) -> Result<Primitive, BuildError> {
    let points = triples(data)?;
    let offset = data
        .marker_offset
        .ok_or(BuildError::Degenerate("line set without marker offset"))? as usize;
    if offset > points.len() || offset % 2 != 0 || offset == 0 {
        return Err(BuildError::Degenerate("line set with bad marker offset"));
    }
    let (seg_points, marker_points) = points.split_at(offset);

    let mut segs = GeomPart::new(PartKind::LineSegments, seg_points.to_vec());
    segs.color = data.color;
    segs.line_width = data.line_width;
    let mut parts = vec![segs];

    if !marker_points.is_empty() {
        let mut markers = GeomPart::new(PartKind::Points, marker_points.to_vec());
        markers.color = data.color;
        markers.point_size = data.point_size;
        parts.push(markers);
    }

    let seg_map = data.indices.as_ref().map(|i| Arc::new(i.clone()));
    Ok(finish(elem, data, parts, seg_map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chamber_elements::{Element, RenderData};

    fn element(id: u64, data: &RenderData) -> Element {
        Element {
            id,
            master_id: None,
            name: "el".to_owned(),
            rnr_self: true,
            rnr_children: true,
            scene_id: 1,
            render_data: Some(data.clone()),
            children: Vec::new(),
            parent: None,
        }
    }

    #[test]
    fn unknown_builder_is_reported() {
        let data = RenderData {
            builder: "Hologram".to_owned(),
            positions: vec![0.0; 3],
            ..RenderData::default()
        };
        let err = StandardFactory
            .build(&element(1, &data), &data)
            .expect_err("unknown");
        assert_eq!(err, BuildError::UnknownBuilder);
    }

    #[test]
    fn track_becomes_segments() {
        let data = RenderData {
            builder: "Track".to_owned(),
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0],
            ..RenderData::default()
        };
        let prim = StandardFactory
            .build(&element(1, &data), &data)
            .expect("build");
        assert_eq!(prim.parts.len(), 1);
        assert_eq!(prim.parts[0].kind, PartKind::LineSegments);
        assert_eq!(prim.parts[0].positions.len(), 4);
    }

    #[test]
    fn degenerate_track_is_skipped() {
        let data = RenderData {
            builder: "Track".to_owned(),
            positions: vec![0.0, 0.0, 0.0],
            ..RenderData::default()
        };
        assert!(matches!(
            StandardFactory.build(&element(1, &data), &data),
            Err(BuildError::Degenerate(_))
        ));
    }

    #[test]
    fn line_set_splits_plexes_and_keeps_map() {
        let data = RenderData {
            builder: "StraightLineSet".to_owned(),
            positions: vec![
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, // segment
                0.5, 0.0, 0.0, // marker
            ],
            indices: Some(vec![0, 0]),
            marker_offset: Some(2),
            point_size: 4.0,
            ..RenderData::default()
        };
        let prim = StandardFactory
            .build(&element(1, &data), &data)
            .expect("build");
        assert_eq!(prim.parts.len(), 2);
        assert_eq!(prim.parts[0].kind, PartKind::LineSegments);
        assert_eq!(prim.parts[1].kind, PartKind::Points);
        assert!(prim.secondary_parts(&[0]).is_some());
    }

    #[test]
    fn matrix_lands_on_every_part() {
        let mut matrix = [0.0f32; 16];
        matrix[0] = 1.0;
        matrix[5] = 1.0;
        matrix[10] = 1.0;
        matrix[15] = 1.0;
        matrix[12] = 3.0; // translate x
        let data = RenderData {
            builder: "Hit".to_owned(),
            positions: vec![0.0, 0.0, 0.0],
            matrix: Some(matrix),
            ..RenderData::default()
        };
        let prim = StandardFactory
            .build(&element(1, &data), &data)
            .expect("build");
        let m = prim.parts[0].model;
        assert!((m.w_axis.x - 3.0).abs() < f32::EPSILON);
    }
}
