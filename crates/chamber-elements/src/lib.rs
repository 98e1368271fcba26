// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Element tree data model for the chamber event display.
//! Pure data (elements, render payloads, change bits) plus the arena store
//! mutated by server-pushed tree messages. No rendering, no transport.

mod element;
mod store;

pub use element::{
    ChangeBits, ChannelId, Element, ElementId, ElementNode, ElementPatch, RenderData, SceneId,
};
pub use store::{ElementStore, Removed, StoreError};
