//! Simulation harness for the Nanum chat core.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation. Operations are
//! applied to both the model and a [`SimWorld`] running the real core, and
//! their observable states are compared.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks what must hold after any operation
//! sequence, including under injected store failures. Use
//! [`InvariantRegistry::standard()`] for the chat core invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod model;
pub mod sim;

pub use invariants::{
    ClosedRoomQuiescence, Invariant, InvariantRegistry, InvariantResult, JoinedAtCoverage,
    ReadByGrowth, RoomSnapshot, SenderInReadBy, SystemSnapshot, Violation,
};
pub use model::{
    Actor, ModelRoomId, ModelWorld, ObservableRoom, ObservableState, Operation, OperationError,
    OperationResult,
};
pub use sim::{SimStore, SimWorld};
