//! # sparse_td
//!
//! Two online learning primitives for perception/control loops:
//!
//! - a lateral-inhibition sparse coder that learns a competitively sparse
//!   representation of its input through local weight updates;
//! - a temporal-difference action controller that drives an opaque
//!   [`region::Region`] to produce continuous actions from a scalar reward.
//!
//! Both are synchronous and deterministic given the caller's random source.
//!
//! ## Quick Start
//!
//! ```
//! use sparse_td::prelude::*;
//!
//! let mut rng = Prng::new(42);
//!
//! // Sparse coder over 16 inputs with 32 competing hidden units.
//! let mut coder = SparseCoder::create_random(16, 32, &mut rng).unwrap();
//! let rates = LearningRates::default();
//! let error = coder.step(&[0.5; 16], &rates).unwrap();
//! assert!(error >= 0.0);
//!
//! // Controller over a 3-entry input whose last entry is the agent's own action.
//! let topology = RegionTopology::with_input(3, 1);
//! let mut ctl: Controller<LinearRegion> =
//!     Controller::create_random(&topology, &ParameterRanges::default(), &mut rng).unwrap();
//! let mut action = [0.0; 3];
//! let report = ctl
//!     .step(0.1, &[0.2, -0.4, 0.0], &[false, false, true], &mut action,
//!           &ControllerParams::default(), &mut rng)
//!     .unwrap();
//! assert!((-1.0..=1.0).contains(&action[2]));
//! # let _ = report;
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): Serialization of configs, params and snapshots
//! - `parallel`: Multi-threaded sparse coder passes via rayon
//!
//! ## Modules
//!
//! - [`sparse_coder`]: Lateral-inhibition sparse coder
//! - [`controller`]: Temporal-difference action controller
//! - [`region`]: Capability trait the controller drives
//! - [`linear_region`]: Minimal reference region
//! - [`prng`]: Caller-owned random source
//! - [`observer`]: Read-only observation adapters

#[path = "core/error.rs"]
pub mod error;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/sparse_coder.rs"]
pub mod sparse_coder;

#[path = "core/region.rs"]
pub mod region;

#[path = "core/linear_region.rs"]
pub mod linear_region;

#[path = "core/controller.rs"]
pub mod controller;

#[path = "core/config.rs"]
pub mod config;

pub mod observer;

pub use error::{Error, Result};

/// Prelude module for convenient imports.
///
/// ```
/// use sparse_td::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{CoderConfig, ControlConfig, RunConfig};
    pub use crate::controller::{Controller, ControllerParams, StepReport};
    pub use crate::error::{Error, Result};
    pub use crate::linear_region::LinearRegion;
    pub use crate::observer::{CoderAdapter, CoderSnapshot, ControllerAdapter, ControllerSnapshot};
    pub use crate::prng::{Prng, RandomSource};
    pub use crate::region::{OutputParams, ParameterRanges, Region, RegionTopology, TraceParams};
    pub use crate::sparse_coder::{ExecutionTier, LearningRates, SparseCoder};
}
