//! Change-notification firehose and reactive query subscriptions (spec §4.4).
//!
//! Wraps a single `LISTEN` connection over the backend's change channel,
//! fans each notification out to every live subscription's prepared
//! stream-variant predicate, and re-matches inverse-link subscriptions when
//! a linked contract (rather than the subscribed contract itself) changes.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod backoff;
mod debounce;
mod events;
mod listener;
mod manager;
mod notification;
mod registry;
mod relationships;
mod subscription;

pub use backoff::Backoff;
pub use debounce::Debouncer;
pub use events::StreamEvent;
pub use listener::spawn_listener;
pub use manager::{check_relationship, StreamManager};
pub use notification::{ChangeKind, ChangeNotification};
pub use registry::SubscriptionRegistry;
pub use relationships::{load_relationships, RelationshipsWriter};
pub use subscription::{ConstFilters, Subscription, SubscriptionId};
