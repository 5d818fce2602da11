#![deny(missing_docs)]
//! Content-addressable overlay network over an N-dimensional coordinate
//! space.
//!
//! Every peer owns a [`zonecast_geometry::Zone`]; the zones of all live
//! peers tile the space exactly. Requests are routed geometrically: unicast
//! towards the peer owning a point, anycast into the region selected by a
//! key, or broadcast to every matching peer with a configurable
//! dissemination strategy. Responses travel the reverse path of their
//! request and are merged hop by hop. Topology changes (join, leave) are
//! guarded by a mutual-exclusion protocol over the affected neighborhood.
//!
//! Peers run as tokio tasks behind the cheap clonable [`Peer`] handle:
//!
//! ```no_run
//! # async fn demo() -> zonecast::ZonecastResult<()> {
//! use zonecast::{handler::DataItem, OverlayConfig, Peer};
//! use zonecast_geometry::{Coordinate, Element};
//!
//! let first = Peer::spawn(OverlayConfig::numeric(2));
//! first.create().await?;
//!
//! let second = Peer::spawn(OverlayConfig::numeric(2));
//! second.join(&first).await?;
//!
//! let at = Coordinate::new(vec![Element::Numeric(0.3), Element::Numeric(0.7)]);
//! first.store(DataItem::new(at.clone(), "hello")).await?;
//! let found = second.lookup(at).await?;
//! assert_eq!(found[0].value, "hello");
//! # Ok(())
//! # }
//! ```

mod types;
pub use types::*;

mod config;
pub use config::*;

pub mod diagnostics;
pub mod handler;
pub mod message;
pub mod neighbor;
pub mod validator;

mod mutex;
mod peer;
mod reply;
mod router;

pub use peer::{Peer, PeerRef, PeerSnapshot};

#[cfg(any(test, feature = "test_utils"))]
pub mod test_util;
