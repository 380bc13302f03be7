//! # xbot core
//!
//! Shared vocabulary of the xbot framework:
//!
//! - **Events**: [`Event`], [`EventType`], [`BoxedEvent`] and the concrete
//!   message, notice, request and meta events
//! - **Messages**: [`Message`] and [`Segment`]
//! - **Bot API**: the outbound [`Bot`] trait handlers use to answer, and
//!   [`ApiError`]

pub mod bot;
pub mod error;
pub mod event;
pub mod message;

pub use bot::{Bot, BoxedBot, downcast_bot};
pub use error::{ApiError, ApiResult};
pub use event::{
    BoxedEvent, Event, EventType, GroupMessage, Meta, Notice, PrivateMessage, Request, Role,
    Sender,
};
pub use message::{Message, Segment};
