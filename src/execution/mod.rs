//! Request execution
//!
//! Everything between trigger data and a dispatched request: the
//! [`Executor`], the resolution pipeline, body encoding, events, plugins and
//! transformers.

mod body;
mod events;
mod executor;
mod plugin;
mod request;
mod resolve;
mod transformers;

pub use body::FieldFilter;
pub use events::{
    Event, EventEmitter, EventHandler, EventHandlers, EventKind, ProgressDirection, ProgressEvent,
};
pub use executor::Executor;
pub use plugin::{HeaderPlugin, RequestPlugin};
pub use request::{HttpMethod, RequestBody, ResolvedRequest};
pub use resolve::normalize_url;
pub use transformers::{
    InputTransformer, ResponseTransformer, TransformKind, Transformer, Transformers,
};
