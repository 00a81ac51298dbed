//! WebSocket layer for the household dashboard.
//!
//! This module provides:
//! - Per-channel connection state with bounded auto-reconnect
//! - A typed publish/subscribe bus on every channel
//! - A registry that keeps one channel per feed for the active household
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  ChannelRegistry                    │
//! │        (one household, one channel per feed)        │
//! └─────────────────────────────────────────────────────┘
//!                         │
//!          ┌──────────────┼──────────────┐
//!          ▼              ▼              ▼
//!   ┌────────────┐ ┌────────────┐ ┌────────────┐
//!   │  Channel   │ │  Channel   │ │  Channel   │
//!   │ dashboard  │ │  weather   │ │  calendar  │
//!   └────────────┘ └────────────┘ └────────────┘
//!          │              │              │
//!          ▼              ▼              ▼
//!      EventBus       EventBus       EventBus
//!          │              │              │
//!          └──────────────┼──────────────┘
//!                         ▼
//!              ┌─────────────────────┐
//!              │   HouseholdStore    │
//!              └─────────────────────┘
//! ```
//!
//! Everything here is single-threaded: channels are `Rc` handles, timers and
//! socket tasks run on the current tokio `LocalSet`.

mod bus;
mod connection;
mod manager;
mod reconnect;
mod scheduler;

pub use bus::{Callback, ChannelEvent, EventBus, EventKind, SubscriberId};
pub use connection::{
    Channel, ChannelId, ChannelKind, ConnectionState, SendError, Transport, TransportError,
    TransportEvent, TransportFactory, TransportSink, WeakChannel, WsTransport,
    WsTransportFactory,
};
pub use manager::ChannelRegistry;
pub use reconnect::{ReconnectPolicy, ReconnectState};
pub use scheduler::{Scheduler, TimerId, TokioScheduler};
