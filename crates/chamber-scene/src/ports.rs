// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Port traits to nudge the engine toward hexagonal boundaries.

use chamber_elements::ElementId;
use chamber_proto::{InvocationRequest, ServerMessage};

use crate::primitive::GeomPart;
use crate::selection::ChannelKind;

/// Session-facing port: receive server messages, send invocation requests.
pub trait SessionPort {
    fn drain_messages(&mut self, max: usize) -> Vec<ServerMessage>;
    /// Fire-and-forget send; `false` means the transport is down and the
    /// request was dropped.
    fn send_invocation(&mut self, req: &InvocationRequest) -> bool;
}

/// Render-facing port; lets the engine request a redraw without coupling to
/// the windowing stack.
pub trait RenderPort {
    fn request_redraw(&self);
}

/// Sink for per-element outline registrations, implemented by the outline
/// registry.
pub trait OutlineSink {
    /// Register geometry to outline for (element, channel). Implementations
    /// apply the highlight-suppressed-by-select rule for whole-object
    /// registrations.
    fn register(
        &mut self,
        element: ElementId,
        channel: ChannelKind,
        sec_sel: bool,
        parts: Vec<GeomPart>,
    );
    fn unregister(&mut self, element: ElementId, channel: ChannelKind);
    /// Drop every registration (scene rebuild).
    fn clear(&mut self);
}
