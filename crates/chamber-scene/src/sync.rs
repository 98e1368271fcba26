// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-scene synchronization between the element tree and the live
//! primitive set.

use std::collections::{HashMap, HashSet};

use chamber_elements::{ChangeBits, Element, ElementId, ElementStore, Removed, SceneId};
use tracing::{debug, warn};

use crate::factory::{BuildError, ObjectFactory};
use crate::primitive::Primitive;

/// Owns, for one scene, the element → primitive mapping (by element id and
/// by master id), the ordered scene-graph container, and the visibility
/// propagation over the element subtree.
///
/// Divergence between server and client state is logged and survived, never
/// raised: a malformed update degrades one element's visuals, not the scene.
#[derive(Debug)]
pub struct SceneSync {
    scene_id: SceneId,
    id2obj: HashMap<ElementId, Primitive>,
    mid2id: HashMap<ElementId, ElementId>,
    container: Vec<ElementId>,
    warned_builders: HashSet<String>,
    first_time: bool,
}

impl SceneSync {
    pub fn new(scene_id: SceneId) -> Self {
        Self {
            scene_id,
            id2obj: HashMap::new(),
            mid2id: HashMap::new(),
            container: Vec::new(),
            warned_builders: HashSet::new(),
            first_time: true,
        }
    }

    pub fn scene_id(&self) -> SceneId {
        self.scene_id
    }

    /// Ordered scene-graph membership (element ids in draw order).
    pub fn container(&self) -> &[ElementId] {
        &self.container
    }

    /// O(1) lookup by element id or, with `by_master`, by master id.
    pub fn lookup(&self, id: ElementId, by_master: bool) -> Option<&Primitive> {
        if by_master {
            self.mid2id.get(&id).and_then(|eid| self.id2obj.get(eid))
        } else {
            self.id2obj.get(&id)
        }
    }

    /// Primitives in container order.
    pub fn primitives(&self) -> impl Iterator<Item = &Primitive> {
        self.container.iter().filter_map(|id| self.id2obj.get(id))
    }

    pub fn len(&self) -> usize {
        self.id2obj.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id2obj.is_empty()
    }

    /// Full rebuild: walk the scene subtree depth-first, rebuild every
    /// drawable element's primitive, recompute visibility from the root.
    ///
    /// Idempotent: a second call with no intervening mutation yields the
    /// same (element, visible, ancestor_visible) set.
    pub fn rebuild_all(&mut self, store: &ElementStore, factory: &dyn ObjectFactory) {
        self.id2obj.clear();
        self.mid2id.clear();
        self.container.clear();
        let Some(root) = store.scene_root(self.scene_id) else {
            return;
        };
        self.build_subtree(store, factory, root);
        propagate_visibility(store, &mut self.id2obj, root, true);
        self.first_time = false;
    }

    /// True until the first rebuild; viewers skip redraw scheduling for
    /// scenes that never produced content.
    pub fn is_first_time(&self) -> bool {
        self.first_time
    }

    /// One element (already inserted into the store) gained existence.
    /// Ancestor visibility is recomputed by re-walking from the scene root;
    /// correctness over micro-optimization.
    pub fn apply_element_added(
        &mut self,
        store: &ElementStore,
        factory: &dyn ObjectFactory,
        id: ElementId,
    ) {
        let Some(el) = store.get(id) else {
            warn!(scene = self.scene_id, element = id, "added element missing from store");
            return;
        };
        if el.render_data.is_some() {
            self.insert_primitive(factory, el);
        }
        if let Some(root) = store.scene_root(self.scene_id) {
            propagate_visibility(store, &mut self.id2obj, root, true);
        }
    }

    /// Mirror a cascading store removal. A record that should have had a
    /// primitive but has none is a consistency error: logged, not raised.
    /// Master-id index entries are intentionally left in place: master ids
    /// alias several elements and outlive any one of them.
    pub fn apply_elements_removed(&mut self, removed: &[Removed]) {
        for r in removed {
            if self.id2obj.remove(&r.id).is_some() {
                self.container.retain(|id| *id != r.id);
            } else if r.had_render_data {
                warn!(
                    scene = self.scene_id,
                    element = r.id,
                    "removal for element with render data but no primitive"
                );
            }
        }
    }

    /// React to an element-changed message already applied to the store.
    pub fn apply_element_changed(
        &mut self,
        store: &ElementStore,
        factory: &dyn ObjectFactory,
        id: ElementId,
        bits: ChangeBits,
    ) {
        let Some(el) = store.get(id) else {
            warn!(scene = self.scene_id, element = id, "change for unknown element");
            return;
        };
        if bits.contains(ChangeBits::RNR_SELF) {
            if let Some(p) = self.id2obj.get_mut(&id) {
                p.visible = p.ancestor_visible && el.rnr_self;
            }
        }
        if bits.contains(ChangeBits::RNR_CHILDREN) {
            // children visibility is not purely local; re-walk the scene
            if let Some(root) = store.scene_root(self.scene_id) {
                propagate_visibility(store, &mut self.id2obj, root, true);
            }
        }
        if (bits.contains(ChangeBits::PROP) || bits.contains(ChangeBits::COLOR_SELECTION))
            && el.render_data.is_some()
        {
            self.replace_element(factory, el);
        }
    }

    /// Rebuild one primitive in place, carrying the old visibility flags
    /// onto the replacement.
    fn replace_element(&mut self, factory: &dyn ObjectFactory, el: &Element) {
        let old_flags = self.id2obj.get(&el.id).map(|p| (p.visible, p.ancestor_visible));
        let Some(data) = &el.render_data else {
            return;
        };
        match factory.build(el, data) {
            Ok(mut prim) => {
                if let Some((visible, ancestor_visible)) = old_flags {
                    prim.visible = visible;
                    prim.ancestor_visible = ancestor_visible;
                } else {
                    warn!(
                        scene = self.scene_id,
                        element = el.id,
                        "replacing element with no prior primitive"
                    );
                }
                if let Some(m) = el.master_id {
                    self.mid2id.insert(m, el.id);
                }
                if !self.container.contains(&el.id) {
                    self.container.push(el.id);
                }
                self.id2obj.insert(el.id, prim);
            }
            Err(err) => self.log_skipped(el, data.builder.as_str(), err),
        }
    }

    fn build_subtree(&mut self, store: &ElementStore, factory: &dyn ObjectFactory, id: ElementId) {
        let Some(el) = store.get(id) else {
            return;
        };
        if el.render_data.is_some() {
            self.insert_primitive(factory, el);
        }
        for &child in &el.children {
            self.build_subtree(store, factory, child);
        }
    }

    fn insert_primitive(&mut self, factory: &dyn ObjectFactory, el: &Element) {
        let Some(data) = &el.render_data else {
            return;
        };
        match factory.build(el, data) {
            Ok(prim) => {
                self.container.push(el.id);
                if let Some(m) = el.master_id {
                    self.mid2id.insert(m, el.id);
                }
                self.id2obj.insert(el.id, prim);
            }
            Err(err) => self.log_skipped(el, data.builder.as_str(), err),
        }
    }

    /// Unknown builder kinds log once per distinct kind to avoid flooding;
    /// the element still participates in visibility propagation for its
    /// children.
    fn log_skipped(&mut self, el: &Element, builder: &str, err: BuildError) {
        match err {
            BuildError::UnknownBuilder => {
                if self.warned_builders.insert(builder.to_owned()) {
                    warn!(scene = self.scene_id, builder, "unknown builder kind, skipping");
                }
            }
            BuildError::Degenerate(why) => {
                debug!(scene = self.scene_id, element = el.id, why, "degenerate payload skipped");
            }
        }
    }
}

/// Thread `rnr_children` down from the root: a primitive is visible exactly
/// when its element renders itself and every ancestor renders children. The
/// root is always ancestor-visible.
fn propagate_visibility(
    store: &ElementStore,
    prims: &mut HashMap<ElementId, Primitive>,
    id: ElementId,
    ancestor_visible: bool,
) {
    let Some(el) = store.get(id) else {
        return;
    };
    if el.render_data.is_some() {
        if let Some(p) = prims.get_mut(&id) {
            p.ancestor_visible = ancestor_visible;
            p.visible = el.rnr_self && ancestor_visible;
        }
    }
    let child_flag = el.rnr_children && ancestor_visible;
    for &child in &el.children {
        propagate_visibility(store, prims, child, child_flag);
    }
}
