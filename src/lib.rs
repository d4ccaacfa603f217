//! Reed-Solomon erasure coding over GF(2^8) for a distributed object store:
//! stripe encoding, differential parity update, bulk recovery, and an
//! incremental-recovery (IR) state machine that reconstructs failed blocks
//! from a stream of partial survivor contributions.
//!
//! This crate performs no I/O and holds no network or on-disk state — block
//! storage, failure detection, and repair scheduling are the caller's
//! responsibility.
//!
//! The three public entry points:
//!
//! - [`context::MathContext`] — `calculate`/`diff`/`refine`/`recover` for one
//!   stripe at a time, dispatched to an XOR fast path when `K=1` or a full
//!   Reed-Solomon path otherwise.
//! - [`ir::IrContext`] — streaming incremental recovery for a Reed-Solomon
//!   stripe, absorbing one survivor contribution at a time.
//! - [`block::BufVec`] / [`block::BufVecMut`] — segmented block views used
//!   by incremental recovery so large blocks need not be contiguous.

pub mod block;
pub mod context;
pub mod error;
pub mod gf;
pub mod ir;
pub mod kernel;
pub mod matrix;
pub mod recovery;

pub use block::{BufVec, BufVecMut};
pub use context::{MathContext, RecoverAlgo, RecoveryPlan};
pub use error::{ParityError, Result};
pub use ir::{ContributionKind, IrContext};
