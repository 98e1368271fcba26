// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wire schema for the chamber session hub (scene tree, selection,
//! method invocations).
//!
//! Scene-tree messages arrive and are applied in server-send order.
//! Selection messages interleave arbitrarily with them and replace the
//! addressed channel's record list wholesale: last confirmed state wins,
//! with no request/reply correlation.

use serde::{Deserialize, Serialize};

use chamber_elements::{ChangeBits, ChannelId, ElementId, ElementNode, ElementPatch, SceneId};

pub mod wire;

/// Session handshake sent by the server before any scene traffic.
///
/// The two global selection channels are server-owned elements; their ids
/// arrive here so the client can address invocation requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Channel id for confirmed (click) selection.
    pub select_channel: ChannelId,
    /// Channel id for transient (hover) highlight.
    pub highlight_channel: ChannelId,
    /// Protocol version for compatibility checks.
    pub protocol_version: u16,
}

/// Server-confirmed state for one entry of a selection channel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRecord {
    /// Element the selection targets.
    pub primary: ElementId,
    /// Elements outlined as a consequence of selecting the primary
    /// (e.g. projected copies in other scenes).
    pub implied: Vec<ElementId>,
    /// Sub-primitive indices for secondary selection; empty = whole object.
    pub sec_idcs: Vec<u32>,
}

/// One incremental mutation inside a scene-changes burst.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SceneChange {
    /// Attach a subtree under an existing parent.
    ElementAdded {
        /// Parent element id.
        parent: ElementId,
        /// Subtree to attach.
        node: ElementNode,
    },
    /// Remove elements and their subtrees.
    ElementsRemoved {
        /// Ids to remove.
        ids: Vec<ElementId>,
    },
    /// Patch one element's attributes per the change bits.
    ElementChanged {
        /// Element id.
        id: ElementId,
        /// Which attribute categories changed.
        bits: ChangeBits,
        /// Replacement field values.
        patch: ElementPatch,
    },
}

/// Messages pushed by the session server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Handshake; first message on a fresh connection.
    Hello(Hello),
    /// Full subtree for a (re)created scene.
    SceneCreated {
        /// Scene id.
        scene_id: SceneId,
        /// Root of the scene's element subtree.
        root: ElementNode,
    },
    /// A burst of element mutations, applied in order, rendered once at the
    /// end of the burst.
    SceneChanges {
        /// Scene id the burst belongs to.
        scene_id: SceneId,
        /// Mutations in server order.
        changes: Vec<SceneChange>,
    },
    /// Wholesale replacement of one selection channel's record list.
    SelectionUpdated {
        /// Addressed channel.
        channel: ChannelId,
        /// New record list; replaces all prior state for the channel.
        records: Vec<SelectionRecord>,
    },
}

/// Remote method-invocation request describing a pick.
///
/// `target` 0 clears the channel. Fire-and-forget: the server answers with
/// an independent [`ServerMessage::SelectionUpdated`], not a reply.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Addressed selection channel.
    pub channel: ChannelId,
    /// Picked element id, or 0 to clear the channel.
    pub target: ElementId,
    /// Multi-select modifier was held.
    pub multi: bool,
    /// The pick names sub-primitive indices.
    pub secondary: bool,
    /// Picked sub-primitive indices; empty unless `secondary`.
    pub sec_idcs: Vec<u32>,
}

/// Messages sent by the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Selection/highlight method invocation.
    Invoke(InvocationRequest),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chamber_elements::RenderData;

    #[test]
    fn scene_created_roundtrip() {
        let msg = ServerMessage::SceneCreated {
            scene_id: 7,
            root: ElementNode {
                children: vec![ElementNode::leaf(
                    2,
                    "track",
                    Some(RenderData {
                        builder: "Track".to_owned(),
                        positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
                        ..RenderData::default()
                    }),
                )],
                ..ElementNode::leaf(1, "event", None)
            },
        };
        let bytes = wire::encode(&msg).expect("encode");
        let back: ServerMessage = wire::decode_body(&bytes[4..]).expect("decode");
        assert_eq!(back, msg);
    }

    #[test]
    fn invoke_roundtrip() {
        let msg = ClientMessage::Invoke(InvocationRequest {
            channel: 3,
            target: 42,
            multi: false,
            secondary: true,
            sec_idcs: vec![3],
        });
        let bytes = wire::encode(&msg).expect("encode");
        let back: ClientMessage = wire::decode_body(&bytes[4..]).expect("decode");
        assert_eq!(back, msg);
    }
}
