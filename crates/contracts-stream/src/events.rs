//! Subscriber-visible events (spec §4.4 "Per-notification algorithm",
//! "Additional request events", "Cancellation"; §7 "the stream manager never
//! raises into the caller thread on delivery failures").

use serde_json::Value;
use uuid::Uuid;

/// One event delivered on a subscription's channel.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A new row now matches the subscription's schema.
    Insert {
        /// The row's id.
        id: Uuid,
        /// The filtered contract.
        after: Value,
    },
    /// A previously-matched row changed and still matches.
    Update {
        /// The row's id.
        id: Uuid,
        /// The filtered contract.
        after: Value,
    },
    /// A previously-matched row was deleted.
    Delete {
        /// The row's id.
        id: Uuid,
    },
    /// A previously-matched row no longer matches the subscription's schema.
    Unmatch {
        /// The row's id.
        id: Uuid,
    },
    /// The reply to an inbound `query(id, schema, options)` request.
    Dataset {
        /// The request's id, echoed back.
        request_id: Uuid,
        /// The matched, filtered contracts.
        contracts: Vec<Value>,
    },
    /// A delivery-time fault that does not tear down the subscription (spec
    /// §7: "emits an `error` event on the subscription and continues").
    Error {
        /// A human-readable message.
        message: String,
    },
    /// The subscription was closed (spec §4.4 "Cancellation").
    Closed,
}
