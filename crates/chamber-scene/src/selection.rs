// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Bridge between local pointer interaction and the server-authoritative
//! selection state.
//!
//! Outlining is authoritative-state-driven, never optimistic: a pick sends a
//! fire-and-forget invocation request, and outlines change only when the
//! server's confirmed record list arrives. Last confirmed list wins; there
//! is no request/reply correlation.

use chamber_elements::{ChannelId, ElementId};
use chamber_proto::{InvocationRequest, SelectionRecord};
use tracing::{debug, warn};

use crate::ports::{OutlineSink, SessionPort};
use crate::sync::SceneSync;

/// The two fixed selection channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Confirmed (click) selection.
    Select,
    /// Transient (hover) highlight.
    Highlight,
}

impl ChannelKind {
    /// Both kinds, select first, in the order the edge passes run.
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Select, ChannelKind::Highlight];

    fn index(self) -> usize {
        match self {
            ChannelKind::Select => 0,
            ChannelKind::Highlight => 1,
        }
    }
}

/// Per-channel protocol state, made inspectable for tests and the HUD.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelState {
    /// No local indication, nothing in flight.
    #[default]
    Idle,
    /// A request was sent; awaiting the server's confirmed list.
    PendingRemote,
    /// The server's list has been applied to the outline registry.
    Applied,
}

/// A pointer hit against a primitive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PickHit {
    pub element_id: ElementId,
    /// Sub-primitive index (segment or point), when the ray resolved one.
    pub sec_idx: Option<u32>,
    /// Multi-select modifier held.
    pub multi: bool,
}

/// Translates picks into invocation requests and confirmed selection lists
/// into outline registrations, de-duplicating so an identical highlight is
/// never re-requested.
#[derive(Debug)]
pub struct SelectionController {
    select_channel: ChannelId,
    highlight_channel: ChannelId,
    states: [ChannelState; 2],
    applied: [Vec<SelectionRecord>; 2],
    registered: [Vec<ElementId>; 2],
}

impl SelectionController {
    pub fn new(select_channel: ChannelId, highlight_channel: ChannelId) -> Self {
        Self {
            select_channel,
            highlight_channel,
            states: [ChannelState::Idle; 2],
            applied: [Vec::new(), Vec::new()],
            registered: [Vec::new(), Vec::new()],
        }
    }

    pub fn state(&self, kind: ChannelKind) -> ChannelState {
        self.states[kind.index()]
    }

    /// Server-confirmed records currently applied for a channel.
    pub fn applied(&self, kind: ChannelKind) -> &[SelectionRecord] {
        &self.applied[kind.index()]
    }

    fn kind_of(&self, channel: ChannelId) -> Option<ChannelKind> {
        if channel == self.select_channel {
            Some(ChannelKind::Select)
        } else if channel == self.highlight_channel {
            Some(ChannelKind::Highlight)
        } else {
            None
        }
    }

    /// Click interaction. `None` clears the select channel (background
    /// click). Always forwarded; the server owns toggle semantics.
    pub fn element_picked(&mut self, session: &mut dyn SessionPort, hit: Option<&PickHit>) {
        let req = match hit {
            Some(h) => InvocationRequest {
                channel: self.select_channel,
                target: h.element_id,
                multi: h.multi,
                secondary: h.sec_idx.is_some(),
                sec_idcs: h.sec_idx.map(|i| vec![i]).unwrap_or_default(),
            },
            None => InvocationRequest {
                channel: self.select_channel,
                ..InvocationRequest::default()
            },
        };
        self.send(session, ChannelKind::Select, &req);
    }

    /// Hover interaction. Suppressed entirely when the hit matches the
    /// applied highlight record, since re-sending would make the server
    /// toggle the highlight off and on every mouse-move tick.
    pub fn element_hovered(
        &mut self,
        session: &mut dyn SessionPort,
        scenes: &[SceneSync],
        hit: &PickHit,
    ) {
        if self.is_applied_highlight(scenes, hit) {
            return;
        }
        let req = InvocationRequest {
            channel: self.highlight_channel,
            target: hit.element_id,
            multi: false,
            secondary: hit.sec_idx.is_some(),
            sec_idcs: hit.sec_idx.map(|i| vec![i]).unwrap_or_default(),
        };
        self.send(session, ChannelKind::Highlight, &req);
    }

    /// Pointer left all primitives. A clear is sent only when the applied
    /// highlight list is non-empty; clearing an empty channel is a no-op.
    pub fn clear_highlight(&mut self, session: &mut dyn SessionPort) {
        if self.applied[ChannelKind::Highlight.index()].is_empty() {
            return;
        }
        let req = InvocationRequest {
            channel: self.highlight_channel,
            ..InvocationRequest::default()
        };
        self.send(session, ChannelKind::Highlight, &req);
    }

    /// Apply a server-confirmed record list for a channel.
    ///
    /// Diffs against the previous list by element id: newly selected
    /// elements are registered, dropped ones unregistered, unchanged ones
    /// untouched. Records whose elements live in no known scene are ignored;
    /// they belong to another viewer sharing the global channel.
    pub fn apply_update(
        &mut self,
        channel: ChannelId,
        records: Vec<SelectionRecord>,
        scenes: &[SceneSync],
        sink: &mut dyn OutlineSink,
    ) {
        let Some(kind) = self.kind_of(channel) else {
            debug!(channel, "selection update for unknown channel ignored");
            return;
        };
        let old = std::mem::take(&mut self.registered[kind.index()]);
        let new_targets = resolve_targets(&records, scenes);

        for id in &old {
            if !new_targets.iter().any(|(tid, _)| tid == id) {
                sink.unregister(*id, kind);
            }
        }
        for (id, rec) in &new_targets {
            if !old.contains(id) {
                register_one(*id, rec, kind, scenes, sink);
            }
        }

        self.registered[kind.index()] = new_targets.into_iter().map(|(id, _)| id).collect();
        self.applied[kind.index()] = records;
        self.states[kind.index()] = ChannelState::Applied;
    }

    /// Re-apply both channels' confirmed records onto a freshly rebuilt
    /// primitive set.
    pub fn reapply(&mut self, scenes: &[SceneSync], sink: &mut dyn OutlineSink) {
        sink.clear();
        for kind in ChannelKind::ALL {
            let records = self.applied[kind.index()].clone();
            let targets = resolve_targets(&records, scenes);
            for (id, rec) in &targets {
                register_one(*id, rec, kind, scenes, sink);
            }
            self.registered[kind.index()] = targets.into_iter().map(|(id, _)| id).collect();
        }
    }

    fn send(&mut self, session: &mut dyn SessionPort, kind: ChannelKind, req: &InvocationRequest) {
        if session.send_invocation(req) {
            self.states[kind.index()] = ChannelState::PendingRemote;
        } else {
            // no retry queue: the next interaction re-sends current intent
            warn!(
                channel = req.channel,
                target = req.target,
                "invocation dropped, transport down"
            );
        }
    }

    /// Duplicate check against the applied highlight record, matching the
    /// hit by element id or by the hit primitive's master id.
    fn is_applied_highlight(&self, scenes: &[SceneSync], hit: &PickHit) -> bool {
        let applied = &self.applied[ChannelKind::Highlight.index()];
        let [rec] = applied.as_slice() else {
            return false;
        };
        let master = scenes
            .iter()
            .find_map(|s| s.lookup(hit.element_id, false))
            .and_then(|p| p.master_id);
        if rec.primary != hit.element_id && Some(rec.primary) != master {
            return false;
        }
        match hit.sec_idx {
            Some(i) => rec.sec_idcs == [i],
            None => rec.sec_idcs.is_empty(),
        }
    }
}

/// Resolve each record to the element to outline in the known scenes: the
/// primary when present, else whichever implied elements are. Foreign
/// records resolve to nothing.
fn resolve_targets<'a>(
    records: &'a [SelectionRecord],
    scenes: &[SceneSync],
) -> Vec<(ElementId, &'a SelectionRecord)> {
    let mut out: Vec<(ElementId, &SelectionRecord)> = Vec::new();
    let known = |id: ElementId| scenes.iter().any(|s| s.lookup(id, false).is_some());
    for rec in records {
        if known(rec.primary) {
            if !out.iter().any(|(id, _)| *id == rec.primary) {
                out.push((rec.primary, rec));
            }
        } else {
            for &imp in &rec.implied {
                if known(imp) && !out.iter().any(|(id, _)| *id == imp) {
                    out.push((imp, rec));
                }
            }
        }
    }
    out
}

fn register_one(
    id: ElementId,
    rec: &SelectionRecord,
    kind: ChannelKind,
    scenes: &[SceneSync],
    sink: &mut dyn OutlineSink,
) {
    let Some(prim) = scenes.iter().find_map(|s| s.lookup(id, false)) else {
        return;
    };
    if rec.sec_idcs.is_empty() {
        sink.register(id, kind, false, prim.parts.clone());
    } else if let Some(parts) = prim.secondary_parts(&rec.sec_idcs) {
        sink.register(id, kind, true, parts);
    } else {
        debug!(element = id, "secondary selection degenerate, skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::StandardFactory;
    use crate::primitive::GeomPart;
    use chamber_elements::{ElementNode, ElementStore, RenderData};
    use chamber_proto::ServerMessage;

    const SELECT: ChannelId = 100;
    const HIGHLIGHT: ChannelId = 101;

    #[derive(Default)]
    struct MockSession {
        sent: Vec<InvocationRequest>,
        down: bool,
    }

    impl SessionPort for MockSession {
        fn drain_messages(&mut self, _max: usize) -> Vec<ServerMessage> {
            Vec::new()
        }
        fn send_invocation(&mut self, req: &InvocationRequest) -> bool {
            if self.down {
                return false;
            }
            self.sent.push(req.clone());
            true
        }
    }

    #[derive(Default)]
    struct MockSink {
        registered: Vec<(ElementId, ChannelKind, bool)>,
        unregistered: Vec<(ElementId, ChannelKind)>,
        cleared: usize,
    }

    impl OutlineSink for MockSink {
        fn register(
            &mut self,
            element: ElementId,
            channel: ChannelKind,
            sec_sel: bool,
            _parts: Vec<GeomPart>,
        ) {
            self.registered.push((element, channel, sec_sel));
        }
        fn unregister(&mut self, element: ElementId, channel: ChannelKind) {
            self.unregistered.push((element, channel));
        }
        fn clear(&mut self) {
            self.cleared += 1;
        }
    }

    fn hit_data() -> RenderData {
        RenderData {
            builder: "Hit".to_owned(),
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0, 3.0, 0.0, 0.0],
            ..RenderData::default()
        }
    }

    fn scene_with(ids: &[ElementId]) -> (ElementStore, SceneSync) {
        let mut store = ElementStore::new();
        let root = ElementNode {
            children: ids
                .iter()
                .map(|&id| ElementNode::leaf(id, "hit", Some(hit_data())))
                .collect(),
            ..ElementNode::leaf(1, "root", None)
        };
        store.apply_scene_created(1, root).expect("create");
        let mut sync = SceneSync::new(1);
        sync.rebuild_all(&store, &StandardFactory);
        (store, sync)
    }

    fn record(primary: ElementId, sec_idcs: &[u32]) -> SelectionRecord {
        SelectionRecord {
            primary,
            implied: Vec::new(),
            sec_idcs: sec_idcs.to_vec(),
        }
    }

    #[test]
    fn repeated_hover_sends_exactly_one_request() {
        let (_store, sync) = scene_with(&[42]);
        let scenes = [sync];
        let mut session = MockSession::default();
        let mut sink = MockSink::default();
        let mut ctrl = SelectionController::new(SELECT, HIGHLIGHT);

        let hit = PickHit {
            element_id: 42,
            sec_idx: Some(3),
            multi: false,
        };
        ctrl.element_hovered(&mut session, &scenes, &hit);
        assert_eq!(ctrl.state(ChannelKind::Highlight), ChannelState::PendingRemote);
        ctrl.apply_update(HIGHLIGHT, vec![record(42, &[3])], &scenes, &mut sink);
        ctrl.element_hovered(&mut session, &scenes, &hit);

        assert_eq!(session.sent.len(), 1);
        assert_eq!(session.sent[0].target, 42);
        assert!(session.sent[0].secondary);
        assert_eq!(session.sent[0].sec_idcs, vec![3]);
    }

    #[test]
    fn identical_reply_leaves_registration_unchanged() {
        let (_store, sync) = scene_with(&[42]);
        let scenes = [sync];
        let mut sink = MockSink::default();
        let mut ctrl = SelectionController::new(SELECT, HIGHLIGHT);

        ctrl.apply_update(HIGHLIGHT, vec![record(42, &[3])], &scenes, &mut sink);
        assert_eq!(ctrl.state(ChannelKind::Highlight), ChannelState::Applied);
        assert_eq!(sink.registered, vec![(42, ChannelKind::Highlight, true)]);

        ctrl.apply_update(HIGHLIGHT, vec![record(42, &[3])], &scenes, &mut sink);
        assert_eq!(sink.registered.len(), 1);
        assert!(sink.unregistered.is_empty());
    }

    #[test]
    fn diff_registers_added_and_unregisters_dropped() {
        let (_store, sync) = scene_with(&[10, 11, 12]);
        let scenes = [sync];
        let mut sink = MockSink::default();
        let mut ctrl = SelectionController::new(SELECT, HIGHLIGHT);

        ctrl.apply_update(
            SELECT,
            vec![record(10, &[]), record(11, &[])],
            &scenes,
            &mut sink,
        );
        ctrl.apply_update(
            SELECT,
            vec![record(11, &[]), record(12, &[])],
            &scenes,
            &mut sink,
        );

        let ids: Vec<ElementId> = sink.registered.iter().map(|(id, _, _)| *id).collect();
        assert_eq!(ids, vec![10, 11, 12]); // 11 registered only once
        assert_eq!(sink.unregistered, vec![(10, ChannelKind::Select)]);
    }

    #[test]
    fn foreign_records_are_ignored_and_implied_resolve() {
        let (_store, sync) = scene_with(&[10]);
        let scenes = [sync];
        let mut sink = MockSink::default();
        let mut ctrl = SelectionController::new(SELECT, HIGHLIGHT);

        // primary unknown, one implied element known here
        let rec = SelectionRecord {
            primary: 777,
            implied: vec![888, 10],
            sec_idcs: Vec::new(),
        };
        ctrl.apply_update(SELECT, vec![rec, record(999, &[])], &scenes, &mut sink);
        assert_eq!(sink.registered, vec![(10, ChannelKind::Select, false)]);
    }

    #[test]
    fn clear_only_sent_when_highlight_nonempty() {
        let (_store, sync) = scene_with(&[42]);
        let scenes = [sync];
        let mut session = MockSession::default();
        let mut sink = MockSink::default();
        let mut ctrl = SelectionController::new(SELECT, HIGHLIGHT);

        ctrl.clear_highlight(&mut session);
        assert!(session.sent.is_empty());

        ctrl.apply_update(HIGHLIGHT, vec![record(42, &[])], &scenes, &mut sink);
        ctrl.clear_highlight(&mut session);
        assert_eq!(session.sent.len(), 1);
        assert_eq!(session.sent[0].target, 0);

        ctrl.apply_update(HIGHLIGHT, Vec::new(), &scenes, &mut sink);
        ctrl.clear_highlight(&mut session);
        assert_eq!(session.sent.len(), 1);
    }

    #[test]
    fn transport_down_drops_request() {
        let mut session = MockSession {
            down: true,
            ..MockSession::default()
        };
        let mut ctrl = SelectionController::new(SELECT, HIGHLIGHT);
        ctrl.element_picked(
            &mut session,
            Some(&PickHit {
                element_id: 5,
                sec_idx: None,
                multi: false,
            }),
        );
        assert!(session.sent.is_empty());
        assert_eq!(ctrl.state(ChannelKind::Select), ChannelState::Idle);
    }

    #[test]
    fn reapply_clears_then_registers_current_state() {
        let (_store, sync) = scene_with(&[10, 11]);
        let scenes = [sync];
        let mut sink = MockSink::default();
        let mut ctrl = SelectionController::new(SELECT, HIGHLIGHT);

        ctrl.apply_update(SELECT, vec![record(10, &[])], &scenes, &mut sink);
        ctrl.apply_update(HIGHLIGHT, vec![record(11, &[])], &scenes, &mut sink);
        sink.registered.clear();

        ctrl.reapply(&scenes, &mut sink);
        assert_eq!(sink.cleared, 1);
        assert_eq!(
            sink.registered,
            vec![
                (10, ChannelKind::Select, false),
                (11, ChannelKind::Highlight, false)
            ]
        );
    }
}
