// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Selection controller driving the real registry: confirmed records in,
//! outline registrations and frame plans out.

use chamber_elements::{ElementNode, ElementStore, RenderData};
use chamber_outline::OutlineRegistry;
use chamber_proto::SelectionRecord;
use chamber_scene::{ChannelKind, SceneSync, SelectionController, StandardFactory};

const SELECT: u64 = 100;
const HIGHLIGHT: u64 = 101;

fn line_set_scene() -> SceneSync {
    let mut store = ElementStore::new();
    let root = ElementNode {
        children: vec![ElementNode::leaf(
            42,
            "lines",
            Some(RenderData {
                builder: "StraightLineSet".to_owned(),
                positions: vec![
                    0.0, 0.0, 0.0, 1.0, 0.0, 0.0, // seg 0
                    1.0, 0.0, 0.0, 2.0, 0.0, 0.0, // seg 1
                    2.0, 0.0, 0.0, 3.0, 0.0, 0.0, // seg 2
                    3.0, 0.0, 0.0, 4.0, 0.0, 0.0, // seg 3
                    0.5, 0.0, 0.0, // marker on line 0
                ],
                indices: Some(vec![0, 0, 1, 1, 0]),
                marker_offset: Some(8),
                ..RenderData::default()
            }),
        )],
        ..ElementNode::leaf(1, "root", None)
    };
    store.apply_scene_created(1, root).expect("create");
    let mut sync = SceneSync::new(1);
    sync.rebuild_all(&store, &StandardFactory);
    sync
}

fn record(primary: u64, sec_idcs: &[u32]) -> SelectionRecord {
    SelectionRecord {
        primary,
        implied: Vec::new(),
        sec_idcs: sec_idcs.to_vec(),
    }
}

#[test]
fn secondary_highlight_lands_in_registry_and_plan() {
    let scenes = [line_set_scene()];
    let mut registry = OutlineRegistry::new();
    let mut ctrl = SelectionController::new(SELECT, HIGHLIGHT);

    ctrl.apply_update(HIGHLIGHT, vec![record(42, &[3])], &scenes, &mut registry);
    assert_eq!(registry.len(), 1);

    let plan = registry.frame_plan().expect("plan");
    assert_eq!(plan.selected, vec![42]);
    let items: Vec<_> = plan.groups.iter().flat_map(|g| &g.items).collect();
    assert!(items.iter().all(|i| i.channel == ChannelKind::Highlight));
    assert!(items.iter().all(|i| i.sec_sel));
    // derived geometry is the picked segment, not the whole line set
    assert_eq!(items[0].part.positions.len(), 2);

    // identical confirmation changes nothing
    ctrl.apply_update(HIGHLIGHT, vec![record(42, &[3])], &scenes, &mut registry);
    assert_eq!(registry.len(), 1);
}

#[test]
fn whole_object_highlight_suppressed_by_confirmed_select() {
    let scenes = [line_set_scene()];
    let mut registry = OutlineRegistry::new();
    let mut ctrl = SelectionController::new(SELECT, HIGHLIGHT);

    ctrl.apply_update(SELECT, vec![record(42, &[])], &scenes, &mut registry);
    ctrl.apply_update(HIGHLIGHT, vec![record(42, &[])], &scenes, &mut registry);
    // the select registration stands alone
    assert_eq!(registry.len(), 1);

    // but after the hover moves away, a secondary highlight on the selected
    // element still registers
    ctrl.apply_update(HIGHLIGHT, Vec::new(), &scenes, &mut registry);
    ctrl.apply_update(HIGHLIGHT, vec![record(42, &[1])], &scenes, &mut registry);
    assert_eq!(registry.len(), 2);
}

#[test]
fn clearing_the_channel_empties_the_plan() {
    let scenes = [line_set_scene()];
    let mut registry = OutlineRegistry::new();
    let mut ctrl = SelectionController::new(SELECT, HIGHLIGHT);

    ctrl.apply_update(HIGHLIGHT, vec![record(42, &[])], &scenes, &mut registry);
    assert!(registry.frame_plan().is_some());

    ctrl.apply_update(HIGHLIGHT, Vec::new(), &scenes, &mut registry);
    assert!(registry.frame_plan().is_none());
}
