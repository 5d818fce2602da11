//! One-to-many dissemination strategies.
//!
//! Three interchangeable strategies, selected per deployment through
//! [`BroadcastStrategy`]. All of them reach every live peer matching the
//! broadcast key at least once; [`efficient`] and [`optimal`] additionally
//! never deliver twice under a consistent neighbor table.

pub(crate) mod efficient;
pub(crate) mod flooding;
pub(crate) mod optimal;

use super::{RouterContext, RoutingDecision};
use crate::config::BroadcastStrategy;
use crate::message::RequestMessage;
use crate::types::ZonecastResult;

pub(crate) fn decide(
    ctx: &RouterContext<'_>,
    request: &RequestMessage,
    strategy: BroadcastStrategy,
) -> ZonecastResult<RoutingDecision> {
    match strategy {
        BroadcastStrategy::Flooding => flooding::decide(ctx, request),
        BroadcastStrategy::Efficient => efficient::decide(ctx, request),
        BroadcastStrategy::Optimal => optimal::decide(ctx, request),
    }
}
