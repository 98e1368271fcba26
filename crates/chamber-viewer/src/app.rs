// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Engine orchestration: drain session messages into the store and scenes,
//! route selection updates, keep the GPU geometry cache coherent, and
//! assemble per-frame draw lists for the base pass and the compositor.

use std::collections::HashMap;

use chamber_elements::{ElementId, ElementStore, SceneId};
use chamber_outline::{
    upload_part, FramePlan, GpuGeom, GpuMaskGroup, OutlineRegistry, SceneDraw,
};
use chamber_proto::{Hello, SceneChange, ServerMessage};
use chamber_scene::{
    ChannelKind, OutlineSink, PickHit, SceneSync, SelectionController, SessionPort,
    StandardFactory,
};
use tracing::{debug, info};

use crate::pick::PickResult;
use crate::session::SessionClient;

/// Scene-mutation messages are applied in arrival order; selection updates
/// interleave freely with them. Everything runs on the frame thread.
pub struct App {
    pub store: ElementStore,
    pub scenes: Vec<SceneSync>,
    pub controller: Option<SelectionController>,
    pub registry: OutlineRegistry,
    pub session: SessionClient,
    factory: StandardFactory,
    cache: HashMap<(ElementId, usize), GpuGeom>,
    last_hover: Option<PickHit>,
}

impl App {
    pub fn new(session: SessionClient) -> Self {
        Self {
            store: ElementStore::new(),
            scenes: Vec::new(),
            controller: None,
            registry: OutlineRegistry::new(),
            session,
            factory: StandardFactory,
            cache: HashMap::new(),
            last_hover: None,
        }
    }

    /// Drain and apply pending session messages. Returns true when anything
    /// changed and a redraw is needed.
    pub fn pump(&mut self) -> bool {
        let messages = self.session.drain_messages(64);
        let changed = !messages.is_empty();
        for msg in messages {
            self.apply(msg);
        }
        changed
    }

    fn apply(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Hello(Hello {
                select_channel,
                highlight_channel,
                protocol_version,
            }) => {
                info!(select_channel, highlight_channel, protocol_version, "session hello");
                self.controller = Some(SelectionController::new(select_channel, highlight_channel));
            }
            ServerMessage::SceneCreated { scene_id, root } => {
                if let Err(err) = self.store.apply_scene_created(scene_id, root) {
                    tracing::warn!(scene_id, %err, "scene create rejected");
                    return;
                }
                self.rebuild_scene(scene_id);
            }
            ServerMessage::SceneChanges { scene_id, changes } => {
                self.apply_changes(scene_id, changes);
            }
            ServerMessage::SelectionUpdated { channel, records } => {
                if let Some(ctrl) = &mut self.controller {
                    ctrl.apply_update(channel, records, &self.scenes, &mut self.registry);
                } else {
                    debug!(channel, "selection update before hello ignored");
                }
            }
        }
    }

    fn rebuild_scene(&mut self, scene_id: SceneId) {
        let mut sync = self
            .scenes
            .iter()
            .position(|s| s.scene_id() == scene_id)
            .map_or_else(|| SceneSync::new(scene_id), |ix| self.scenes.remove(ix));
        sync.rebuild_all(&self.store, &self.factory);
        self.scenes.push(sync);
        self.cache.clear();
        if let Some(ctrl) = &mut self.controller {
            ctrl.reapply(&self.scenes, &mut self.registry);
        }
    }

    fn apply_changes(&mut self, scene_id: SceneId, changes: Vec<SceneChange>) {
        let Some(ix) = self.scenes.iter().position(|s| s.scene_id() == scene_id) else {
            debug!(scene_id, "changes for unknown scene ignored");
            return;
        };
        for change in changes {
            match change {
                SceneChange::ElementAdded { parent, node } => {
                    match self.store.apply_element_added(parent, node) {
                        Ok(ids) => {
                            for id in ids {
                                self.scenes[ix].apply_element_added(&self.store, &self.factory, id);
                            }
                        }
                        Err(err) => tracing::warn!(scene_id, %err, "element add rejected"),
                    }
                }
                SceneChange::ElementsRemoved { ids } => {
                    let removed = self.store.apply_elements_removed(&ids);
                    for r in &removed {
                        self.cache.retain(|(id, _), _| *id != r.id);
                        for kind in ChannelKind::ALL {
                            self.registry.unregister(r.id, kind);
                        }
                    }
                    self.scenes[ix].apply_elements_removed(&removed);
                }
                SceneChange::ElementChanged { id, bits, patch } => {
                    if let Err(err) = self.store.apply_element_changed(id, bits, &patch) {
                        tracing::warn!(scene_id, %err, "element change rejected");
                        continue;
                    }
                    self.scenes[ix].apply_element_changed(&self.store, &self.factory, id, bits);
                    self.cache.retain(|(cid, _), _| *cid != id);
                }
            }
        }
    }

    /// Hover routing with pointer-leave clearing.
    pub fn pointer_moved(&mut self, hit: Option<PickResult>) {
        let Some(ctrl) = &mut self.controller else {
            return;
        };
        match hit {
            Some(h) => {
                let hit = PickHit {
                    element_id: h.element_id,
                    sec_idx: h.sec_idx,
                    multi: false,
                };
                ctrl.element_hovered(&mut self.session, &self.scenes, &hit);
                self.last_hover = Some(hit);
            }
            None => {
                if self.last_hover.take().is_some() {
                    ctrl.clear_highlight(&mut self.session);
                }
            }
        }
    }

    pub fn pointer_clicked(&mut self, hit: Option<PickResult>, multi: bool) {
        let Some(ctrl) = &mut self.controller else {
            return;
        };
        let hit = hit.map(|h| PickHit {
            element_id: h.element_id,
            sec_idx: h.sec_idx,
            multi,
        });
        ctrl.element_picked(&mut self.session, hit.as_ref());
    }

    /// Upload any container parts missing from the cache.
    pub fn ensure_uploaded(&mut self, device: &wgpu::Device) {
        for scene in &self.scenes {
            for prim in scene.primitives() {
                for (i, part) in prim.parts.iter().enumerate() {
                    self.cache
                        .entry((prim.element_id, i))
                        .or_insert_with(|| upload_part(device, part));
                }
            }
        }
    }

    /// Current outline plan, shared by draw-list assembly and the mask pass.
    pub fn frame_plan(&self) -> Option<FramePlan> {
        self.registry.frame_plan()
    }

    /// Base-pass draw list: every visible part, flagged when its element
    /// carries an outline registration.
    pub fn scene_draws<'a>(&'a self, plan: Option<&FramePlan>) -> Vec<SceneDraw<'a>> {
        let selected: &[ElementId] = plan.map_or(&[], |p| p.selected.as_slice());
        let mut draws = Vec::new();
        for scene in &self.scenes {
            for prim in scene.primitives().filter(|p| p.visible) {
                for (i, _) in prim.parts.iter().enumerate() {
                    if let Some(geom) = self.cache.get(&(prim.element_id, i)) {
                        draws.push(SceneDraw {
                            geom,
                            selected: selected.contains(&prim.element_id),
                        });
                    }
                }
            }
        }
        draws
    }

    /// Upload the plan's geometry as transient buffers for this frame's mask
    /// passes. Derived secondary geometry never enters the cache or the
    /// scene container.
    pub fn upload_plan(&self, device: &wgpu::Device, plan: &FramePlan) -> Vec<Vec<GpuGeom>> {
        plan.groups
            .iter()
            .map(|group| {
                group
                    .items
                    .iter()
                    .map(|item| upload_part(device, &item.part))
                    .collect()
            })
            .collect()
    }

    /// Borrow the transient uploads into mask groups for the compositor.
    pub fn mask_groups<'a>(
        &self,
        plan: &FramePlan,
        uploads: &'a [Vec<GpuGeom>],
    ) -> Vec<GpuMaskGroup<'a>> {
        plan.groups
            .iter()
            .zip(uploads)
            .map(|(group, geoms)| GpuMaskGroup {
                items: group
                    .items
                    .iter()
                    .zip(geoms)
                    .map(|(item, geom)| (geom, item.channel))
                    .collect(),
            })
            .collect()
    }

    pub fn primitive_count(&self) -> usize {
        self.scenes.iter().map(SceneSync::len).sum()
    }
}
