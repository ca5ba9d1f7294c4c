//! Conversation management: sessions, context, dispatch, and the HTTP
//! handlers that tie them together.

pub mod dispatcher;
pub mod handlers;
pub mod store;
pub mod suggestions;

pub use dispatcher::Dispatcher;
pub use store::SessionStore;
