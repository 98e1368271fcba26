// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! End-to-end drive of the engine: server messages in, outline
//! registrations and invocation requests out.

use chamber_elements::{ChangeBits, ElementId, ElementNode, ElementStore, RenderData};
use chamber_proto::{
    InvocationRequest, SceneChange, SelectionRecord, ServerMessage,
};
use chamber_scene::{
    ChannelKind, GeomPart, OutlineSink, PickHit, SceneSync, SelectionController, SessionPort,
    StandardFactory,
};

const SELECT: u64 = 100;
const HIGHLIGHT: u64 = 101;

#[derive(Default)]
struct Session {
    sent: Vec<InvocationRequest>,
}

impl SessionPort for Session {
    fn drain_messages(&mut self, _max: usize) -> Vec<ServerMessage> {
        Vec::new()
    }
    fn send_invocation(&mut self, req: &InvocationRequest) -> bool {
        self.sent.push(req.clone());
        true
    }
}

#[derive(Default)]
struct Sink {
    entries: Vec<(ElementId, ChannelKind, bool)>,
}

impl OutlineSink for Sink {
    fn register(&mut self, element: ElementId, channel: ChannelKind, sec_sel: bool, _: Vec<GeomPart>) {
        self.entries.push((element, channel, sec_sel));
    }
    fn unregister(&mut self, element: ElementId, channel: ChannelKind) {
        self.entries.retain(|(id, ch, _)| !(*id == element && *ch == channel));
    }
    fn clear(&mut self) {
        self.entries.clear();
    }
}

fn mesh(id: ElementId, rnr_self: bool) -> ElementNode {
    ElementNode {
        rnr_self,
        ..ElementNode::leaf(
            id,
            "mesh",
            Some(RenderData {
                builder: "Mesh".to_owned(),
                positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
                ..RenderData::default()
            }),
        )
    }
}

struct Harness {
    store: ElementStore,
    scenes: Vec<SceneSync>,
    controller: SelectionController,
    session: Session,
    sink: Sink,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: ElementStore::new(),
            scenes: Vec::new(),
            controller: SelectionController::new(SELECT, HIGHLIGHT),
            session: Session::default(),
            sink: Sink::default(),
        }
    }

    /// The viewer's message pump, reduced to what the engine sees.
    fn apply(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Hello(_) => {}
            ServerMessage::SceneCreated { scene_id, root } => {
                self.store.apply_scene_created(scene_id, root).expect("scene");
                let mut sync = SceneSync::new(scene_id);
                sync.rebuild_all(&self.store, &StandardFactory);
                self.scenes.retain(|s| s.scene_id() != scene_id);
                self.scenes.push(sync);
                self.controller.reapply(&self.scenes, &mut self.sink);
            }
            ServerMessage::SceneChanges { scene_id, changes } => {
                let Some(ix) = self.scenes.iter().position(|s| s.scene_id() == scene_id) else {
                    return;
                };
                for change in changes {
                    match change {
                        SceneChange::ElementAdded { parent, node } => {
                            let ids = self.store.apply_element_added(parent, node).expect("add");
                            for id in ids {
                                self.scenes[ix].apply_element_added(&self.store, &StandardFactory, id);
                            }
                        }
                        SceneChange::ElementsRemoved { ids } => {
                            let removed = self.store.apply_elements_removed(&ids);
                            self.scenes[ix].apply_elements_removed(&removed);
                        }
                        SceneChange::ElementChanged { id, bits, patch } => {
                            self.store.apply_element_changed(id, bits, &patch).expect("change");
                            self.scenes[ix].apply_element_changed(&self.store, &StandardFactory, id, bits);
                        }
                    }
                }
            }
            ServerMessage::SelectionUpdated { channel, records } => {
                self.controller
                    .apply_update(channel, records, &self.scenes, &mut self.sink);
            }
        }
    }
}

fn two_leaf_scene() -> ServerMessage {
    ServerMessage::SceneCreated {
        scene_id: 1,
        root: ElementNode {
            children: vec![ElementNode {
                children: vec![mesh(3, true), mesh(4, false)],
                ..ElementNode::leaf(2, "sceneA", None)
            }],
            ..ElementNode::leaf(1, "root", None)
        },
    }
}

#[test]
fn scene_create_applies_visibility() {
    let mut h = Harness::new();
    h.apply(two_leaf_scene());
    let sync = &h.scenes[0];
    assert!(sync.lookup(3, false).expect("leaf1").visible);
    assert!(!sync.lookup(4, false).expect("leaf2").visible);
}

#[test]
fn removal_message_cascades_into_scene() {
    let mut h = Harness::new();
    h.apply(two_leaf_scene());
    h.apply(ServerMessage::SceneChanges {
        scene_id: 1,
        changes: vec![SceneChange::ElementsRemoved { ids: vec![3] }],
    });
    let sync = &h.scenes[0];
    assert!(sync.lookup(3, false).is_none());
    assert!(!sync.container().contains(&3));
}

#[test]
fn highlight_round_trip_with_dedup() {
    let mut h = Harness::new();
    h.apply(two_leaf_scene());

    // hover leaf 3 → one request
    let hit = PickHit {
        element_id: 3,
        sec_idx: None,
        multi: false,
    };
    let mut session = std::mem::take(&mut h.session);
    h.controller.element_hovered(&mut session, &h.scenes, &hit);
    assert_eq!(session.sent.len(), 1);

    // server confirms; registration appears
    h.apply(ServerMessage::SelectionUpdated {
        channel: HIGHLIGHT,
        records: vec![SelectionRecord {
            primary: 3,
            implied: Vec::new(),
            sec_idcs: Vec::new(),
        }],
    });
    assert_eq!(h.sink.entries, vec![(3, ChannelKind::Highlight, false)]);

    // identical hover is suppressed, identical reply changes nothing
    h.controller.element_hovered(&mut session, &h.scenes, &hit);
    assert_eq!(session.sent.len(), 1);
    h.apply(ServerMessage::SelectionUpdated {
        channel: HIGHLIGHT,
        records: vec![SelectionRecord {
            primary: 3,
            implied: Vec::new(),
            sec_idcs: Vec::new(),
        }],
    });
    assert_eq!(h.sink.entries.len(), 1);
}

#[test]
fn selection_survives_scene_recreate() {
    let mut h = Harness::new();
    h.apply(two_leaf_scene());
    h.apply(ServerMessage::SelectionUpdated {
        channel: SELECT,
        records: vec![SelectionRecord {
            primary: 3,
            implied: Vec::new(),
            sec_idcs: Vec::new(),
        }],
    });
    assert_eq!(h.sink.entries.len(), 1);

    // server re-creates the scene; registrations are rebuilt, not leaked
    h.apply(two_leaf_scene());
    assert_eq!(h.sink.entries, vec![(3, ChannelKind::Select, false)]);
}

#[test]
fn property_change_rebuilds_primitive_in_place() {
    let mut h = Harness::new();
    h.apply(two_leaf_scene());
    let new_data = RenderData {
        builder: "Mesh".to_owned(),
        positions: vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0, 0.0],
        color: [0.0, 1.0, 0.0, 1.0],
        ..RenderData::default()
    };
    h.apply(ServerMessage::SceneChanges {
        scene_id: 1,
        changes: vec![SceneChange::ElementChanged {
            id: 4,
            bits: ChangeBits::PROP,
            patch: chamber_elements::ElementPatch {
                render_data: Some(new_data),
                ..chamber_elements::ElementPatch::default()
            },
        }],
    });
    let prim = h.scenes[0].lookup(4, false).expect("leaf2");
    assert!((prim.parts[0].color[1] - 1.0).abs() < f32::EPSILON);
    assert!(!prim.visible); // visibility carried across the swap
}
