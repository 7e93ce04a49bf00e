//! Model-based testing.
//!
//! [`ModelWorld`] is the oracle. Each [`Operation`] is applied to it and to a
//! [`crate::SimWorld`]; results and observable states must agree whenever the
//! store is reliable.

mod operation;
mod world;

pub use operation::{Actor, ModelRoomId, Operation, OperationError, OperationResult};
pub use world::{ModelWorld, ObservableRoom, ObservableState};
