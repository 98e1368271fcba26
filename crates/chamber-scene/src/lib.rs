// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scene synchronization and selection engine for the chamber event display.
//!
//! Mirrors the server-pushed element tree into renderable primitives
//! (per-scene, incrementally), and bridges local pointer interaction with
//! the server-authoritative selection state. Rendering itself lives behind
//! the port traits in [`ports`].

mod factory;
mod ports;
mod primitive;
mod selection;
mod sync;

pub use factory::{BuildError, ObjectFactory, StandardFactory};
pub use ports::{OutlineSink, RenderPort, SessionPort};
pub use primitive::{
    GeomPart, PartKind, PointShader, Primitive, RenderSignature, SignatureCategory,
};
pub use selection::{ChannelKind, ChannelState, PickHit, SelectionController};
pub use sync::SceneSync;
