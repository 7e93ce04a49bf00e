//! Chat
//!
//! Room core of the Nanum group-purchase marketplace. Gives every participant
//! a personal, join-time-relative view of a shared message log on top of a
//! passive document store.
//!
//! # Architecture
//!
//! There is no server-side logic and no cross-document transaction. Every
//! multi-step operation is a sequence of independent atomic writes built to
//! converge under retry: `ensure_room` self-heals memberships, receipts are
//! set-union merges, and closing a room is terminal and repeatable.
//!
//! # Components
//!
//! - [`ChatService`]: Entry point composing everything below
//! - [`RoomDirectory`]: Creates rooms and repairs memberships
//! - [`MessageLog`]: Sends messages and serves [`MessageFeed`]s
//! - [`Viewer`]: Per-viewer join-time and block filtering
//! - [`ReceiptTracker`]: Batched read receipts with a per-room dedup cache
//! - [`LifecycleController`]: Member leave and owner teardown
//! - [`Session`]: Explicit caller identity threaded into every operation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod directory;
mod error;
mod ids;
mod lifecycle;
mod log;
mod message;
mod receipts;
mod room;
mod service;
mod session;
mod visibility;

pub use config::{ChatConfig, Notices};
pub use directory::{EnsureOutcome, EnsurePlan, EnsureRoom, RoomDirectory, plan_ensure};
pub use error::ChatError;
pub use ids::{ListingId, MessageId, ParticipantId, RoomId, SYSTEM_SENDER};
pub use lifecycle::{LeaveOutcome, LifecycleController};
pub use log::{MessageFeed, MessageLog, MessagesCallback};
pub use message::Message;
pub use receipts::{
    ReadCache, ReceiptTracker, is_read_by_others, pending_receipts, room_unread_count, unread_count,
};
pub use room::{Room, RoomKind, RoomState, listing_path, messages_collection, room_path, rooms_collection};
pub use service::ChatService;
pub use session::{Caller, Session};
pub use visibility::{Viewer, visibility_floor, visible};
