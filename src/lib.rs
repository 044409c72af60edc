//! # distmap
//!
//! distmap is a distributed index-redistribution library for scientific
//! computing and data-parallel codes. Given a global N-dimensional index
//! space partitioned arbitrarily across a group of cooperating ranks, it
//! negotiates a minimal set of point-to-point send/receive schedules
//! between a *source* and a *destination* decomposition, then executes
//! typed bulk exchanges that move element values from the ranks that own
//! them to the ranks that want them.
//!
//! ## Features
//! - [`IndexList`](idxlist::IndexList): immutable rank-local lists of
//!   global indices, one per role
//! - [`Map`](map::Map): the collectively negotiated exchange plan — a
//!   three-phase all-to-all negotiation with deterministic, symmetric
//!   schedules
//! - [`Map::lift`](map::Map::lift): derive a higher-rank map across a
//!   contiguous level dimension without re-running the negotiation
//! - [`Exchanger`](exchange::Exchanger): typed executor for any
//!   fixed-width `Pod` element type, with pluggable host or GPU staging
//! - Pluggable transports (serial, threaded, MPI) behind a small
//!   [`Communicator`](comm::Communicator) trait
//!
//! ## Usage
//! Add `distmap` as a dependency and enable features as needed:
//!
//! ```toml
//! [dependencies]
//! distmap = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "rayon", "wgpu"]
//! ```
//!
//! A rank that owns indices `{0, 2, 1}` and wants `{1}` builds its side
//! of a map like this (collectively with every other rank of the group):
//!
//! ```
//! use std::sync::Arc;
//! use distmap::prelude::*;
//!
//! let comm = Arc::new(NoComm); // serial group of size 1
//! let src = IndexList::new(&[0, 2, 1]);
//! let dst = IndexList::new(&[1]);
//! let map = Map::new(&src, &dst, -1, comm)?;
//! let mut ex = Exchanger::<f64, _>::new(Arc::new(map))?;
//! let mut out = [0.0];
//! ex.go(&[10.0, 20.0, 30.0], &mut out)?;
//! assert_eq!(out, [30.0]);
//! # Ok::<(), distmap::error::DistMapError>(())
//! ```

pub mod comm;
pub mod debug_invariants;
pub mod error;
pub mod exchange;
pub mod idxlist;
pub mod map;
pub mod wire;

/// A convenient prelude to import the most-used traits & types.
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::comm::{CommTag, Communicator, NoComm, ThreadComm, Wait};
    pub use crate::error::DistMapError;
    pub use crate::exchange::{Exchanger, MemorySpace, Staging, VecStaging};
    pub use crate::idxlist::{GlobalIndex, IndexList};
    pub use crate::map::{ExchangeSchedule, Map, MapConfig, PeerLeg};
}
