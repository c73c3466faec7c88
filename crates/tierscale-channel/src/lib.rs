//! tierscale-channel — in-process message transport between roles.
//!
//! Each role registers a named endpoint on a shared [`MessageBus`] and gets
//! back a [`Mailbox`] to receive from. Sending goes through a [`BusSender`]
//! stamped with the sender's endpoint name.
//!
//! ```text
//! MessageBus
//!   ├── register("decider") → Mailbox
//!   │     ├── recv_timeout()      bounded wait, ReceiveTimeout on expiry
//!   │     └── recv_or_shutdown()  bounded wait raced against a stop signal
//!   └── sender("monitor")   → BusSender::send(OutboundMessage)
//! ```
//!
//! Delivery is FIFO per sender/receiver pair. Nothing orders messages across
//! different senders.

pub mod bus;
pub mod error;

pub use bus::{BusSender, Delivery, Mailbox, MessageBus};
pub use error::{ChannelError, ChannelResult};
