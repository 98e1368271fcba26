// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Arena store for the server-pushed element hierarchy.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::element::{ChangeBits, Element, ElementId, ElementNode, ElementPatch, SceneId};

/// Errors raised by store mutations.
///
/// These indicate client/server divergence; callers log them as consistency
/// errors and continue with best-effort state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// An inserted subtree reuses an id already present in the arena.
    #[error("duplicate element: {0}")]
    DuplicateElement(ElementId),
    /// A mutation referenced an id the arena does not hold.
    #[error("missing element: {0}")]
    MissingElement(ElementId),
    /// A mutation referenced a scene with no root.
    #[error("missing scene: {0}")]
    MissingScene(SceneId),
}

/// Record of one element dropped by a cascading removal.
///
/// `had_render_data` lets the scene engine distinguish "primitive should have
/// existed" from "structural node" when mirroring the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removed {
    /// Id of the dropped element.
    pub id: ElementId,
    /// Whether the element carried a render payload when dropped.
    pub had_render_data: bool,
}

/// Arena of elements keyed by id, with one root per scene.
///
/// All mutation entry points mirror the inbound tree messages; iteration
/// helpers serve the scene engine's visibility walks.
#[derive(Debug, Default)]
pub struct ElementStore {
    elements: HashMap<ElementId, Element>,
    roots: BTreeMap<SceneId, ElementId>,
}

impl ElementStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an element by id.
    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    /// Root element of a scene, if the scene exists.
    pub fn scene_root(&self, scene: SceneId) -> Option<ElementId> {
        self.roots.get(&scene).copied()
    }

    /// Scene ids in ascending order.
    pub fn scenes(&self) -> impl Iterator<Item = SceneId> + '_ {
        self.roots.keys().copied()
    }

    /// Child ids of an element, empty when the element is unknown.
    pub fn children_of(&self, id: ElementId) -> &[ElementId] {
        self.elements
            .get(&id)
            .map_or(&[], |el| el.children.as_slice())
    }

    /// Number of elements held.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when the arena holds nothing.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Install a scene's full subtree, replacing any previous generation of
    /// that scene.
    pub fn apply_scene_created(
        &mut self,
        scene: SceneId,
        root: ElementNode,
    ) -> Result<(), StoreError> {
        if let Some(old_root) = self.roots.remove(&scene) {
            self.drop_subtree(old_root, &mut Vec::new());
        }
        let root_id = root.id;
        self.insert_subtree(scene, None, root)?;
        self.roots.insert(scene, root_id);
        Ok(())
    }

    /// Attach one subtree under an existing parent. Returns the ids inserted,
    /// depth-first, subtree root first.
    pub fn apply_element_added(
        &mut self,
        parent: ElementId,
        node: ElementNode,
    ) -> Result<Vec<ElementId>, StoreError> {
        let scene = self
            .elements
            .get(&parent)
            .ok_or(StoreError::MissingElement(parent))?
            .scene_id;
        let mut inserted = Vec::new();
        self.collect_subtree_ids(&node, &mut inserted)?;
        self.insert_subtree(scene, Some(parent), node)?;
        Ok(inserted)
    }

    /// Remove elements and their subtrees. Unknown ids are skipped; the
    /// returned records cover every element actually dropped, depth-first.
    pub fn apply_elements_removed(&mut self, ids: &[ElementId]) -> Vec<Removed> {
        let mut dropped = Vec::new();
        for &id in ids {
            if !self.elements.contains_key(&id) {
                continue;
            }
            self.unlink_from_parent(id);
            self.roots.retain(|_, root| *root != id);
            self.drop_subtree(id, &mut dropped);
        }
        dropped
    }

    /// Patch an element per the change bits of an element-changed message.
    pub fn apply_element_changed(
        &mut self,
        id: ElementId,
        bits: ChangeBits,
        patch: &ElementPatch,
    ) -> Result<(), StoreError> {
        let el = self
            .elements
            .get_mut(&id)
            .ok_or(StoreError::MissingElement(id))?;
        if bits.contains(ChangeBits::RNR_SELF) {
            if let Some(v) = patch.rnr_self {
                el.rnr_self = v;
            }
        }
        if bits.contains(ChangeBits::RNR_CHILDREN) {
            if let Some(v) = patch.rnr_children {
                el.rnr_children = v;
            }
        }
        if bits.contains(ChangeBits::PROP) || bits.contains(ChangeBits::COLOR_SELECTION) {
            if let Some(name) = &patch.name {
                el.name = name.clone();
            }
            if let Some(data) = &patch.render_data {
                el.render_data = Some(data.clone());
            }
        }
        Ok(())
    }

    fn insert_subtree(
        &mut self,
        scene: SceneId,
        parent: Option<ElementId>,
        node: ElementNode,
    ) -> Result<(), StoreError> {
        if self.elements.contains_key(&node.id) {
            return Err(StoreError::DuplicateElement(node.id));
        }
        let id = node.id;
        let child_ids: Vec<ElementId> = node.children.iter().map(|c| c.id).collect();
        self.elements.insert(
            id,
            Element {
                id,
                master_id: node.master_id,
                name: node.name,
                rnr_self: node.rnr_self,
                rnr_children: node.rnr_children,
                scene_id: scene,
                render_data: node.render_data,
                children: child_ids,
                parent,
            },
        );
        if let Some(p) = parent {
            if let Some(pel) = self.elements.get_mut(&p) {
                if !pel.children.contains(&id) {
                    pel.children.push(id);
                }
            }
        }
        for child in node.children {
            self.insert_subtree(scene, Some(id), child)?;
        }
        Ok(())
    }

    fn collect_subtree_ids(
        &self,
        node: &ElementNode,
        out: &mut Vec<ElementId>,
    ) -> Result<(), StoreError> {
        if self.elements.contains_key(&node.id) {
            return Err(StoreError::DuplicateElement(node.id));
        }
        out.push(node.id);
        for child in &node.children {
            self.collect_subtree_ids(child, out)?;
        }
        Ok(())
    }

    fn unlink_from_parent(&mut self, id: ElementId) {
        let parent = self.elements.get(&id).and_then(|el| el.parent);
        if let Some(p) = parent {
            if let Some(pel) = self.elements.get_mut(&p) {
                pel.children.retain(|c| *c != id);
            }
        }
    }

    fn drop_subtree(&mut self, id: ElementId, dropped: &mut Vec<Removed>) {
        let Some(el) = self.elements.remove(&id) else {
            return;
        };
        dropped.push(Removed {
            id,
            had_render_data: el.render_data.is_some(),
        });
        for child in el.children {
            self.drop_subtree(child, dropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::RenderData;

    fn mesh_data() -> RenderData {
        RenderData {
            builder: "Mesh".to_owned(),
            positions: vec![0.0; 9],
            ..RenderData::default()
        }
    }

    fn sample_scene() -> ElementNode {
        ElementNode {
            children: vec![
                ElementNode::leaf(2, "leaf1", Some(mesh_data())),
                ElementNode {
                    children: vec![ElementNode::leaf(4, "grandchild", Some(mesh_data()))],
                    ..ElementNode::leaf(3, "branch", None)
                },
            ],
            ..ElementNode::leaf(1, "root", None)
        }
    }

    #[test]
    fn scene_created_flattens_subtree() {
        let mut store = ElementStore::new();
        store.apply_scene_created(10, sample_scene()).expect("create");
        assert_eq!(store.scene_root(10), Some(1));
        assert_eq!(store.len(), 4);
        assert_eq!(store.children_of(1), &[2, 3]);
        assert_eq!(store.get(4).expect("grandchild").parent, Some(3));
        assert_eq!(store.get(4).expect("grandchild").scene_id, 10);
    }

    #[test]
    fn scene_created_replaces_previous_generation() {
        let mut store = ElementStore::new();
        store.apply_scene_created(10, sample_scene()).expect("create");
        store
            .apply_scene_created(10, ElementNode::leaf(1, "root", None))
            .expect("recreate");
        assert_eq!(store.len(), 1);
        assert!(store.get(4).is_none());
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut store = ElementStore::new();
        store.apply_scene_created(10, sample_scene()).expect("create");
        let err = store
            .apply_element_added(1, ElementNode::leaf(2, "dup", None))
            .expect_err("duplicate");
        assert_eq!(err, StoreError::DuplicateElement(2));
    }

    #[test]
    fn element_added_links_parent_and_reports_ids() {
        let mut store = ElementStore::new();
        store.apply_scene_created(10, sample_scene()).expect("create");
        let node = ElementNode {
            children: vec![ElementNode::leaf(6, "sub", Some(mesh_data()))],
            ..ElementNode::leaf(5, "added", None)
        };
        let ids = store.apply_element_added(3, node).expect("add");
        assert_eq!(ids, vec![5, 6]);
        assert_eq!(store.children_of(3), &[4, 5]);
        assert_eq!(store.get(6).expect("sub").scene_id, 10);
    }

    #[test]
    fn removal_cascades_depth_first() {
        let mut store = ElementStore::new();
        store.apply_scene_created(10, sample_scene()).expect("create");
        let dropped = store.apply_elements_removed(&[3]);
        let ids: Vec<ElementId> = dropped.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert!(dropped[1].had_render_data);
        assert!(!dropped[0].had_render_data);
        assert_eq!(store.children_of(1), &[2]);
        // unknown ids are skipped, not an error
        assert!(store.apply_elements_removed(&[99]).is_empty());
    }

    #[test]
    fn change_bits_gate_patch_fields() {
        let mut store = ElementStore::new();
        store.apply_scene_created(10, sample_scene()).expect("create");
        let patch = ElementPatch {
            rnr_self: Some(false),
            rnr_children: Some(false),
            name: Some("renamed".to_owned()),
            render_data: None,
        };
        store
            .apply_element_changed(2, ChangeBits::RNR_SELF, &patch)
            .expect("change");
        let el = store.get(2).expect("leaf1");
        assert!(!el.rnr_self);
        // bits not set: children flag and name untouched
        assert!(el.rnr_children);
        assert_eq!(el.name, "leaf1");

        let err = store
            .apply_element_changed(99, ChangeBits::PROP, &patch)
            .expect_err("missing");
        assert_eq!(err, StoreError::MissingElement(99));
    }
}
