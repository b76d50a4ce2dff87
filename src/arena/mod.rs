//! The concurrent session-and-pairing engine: connection lifecycle, the
//! waiting queue, human/AI pairing, message routing, inactivity eviction,
//! and durable conversation logging.

pub mod ai_participant;
pub mod ai_registry;
pub mod catalog;
pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod evictor;
pub mod memory;
pub mod pairer;
pub mod persona;
pub mod prompt;
pub mod protocol;
pub mod provider;
pub mod queue;
pub mod sanitize;
pub mod sentiment;
pub mod server;
pub mod session;

pub use ai_registry::AIRegistry;
pub use catalog::CatalogStore;
pub use config::ArenaConfig;
pub use conversation::ConversationLog;
pub use dispatcher::Dispatcher;
pub use error::{ArenaError, ArenaResult};
pub use evictor::InactivityEvictor;
pub use pairer::Pairer;
pub use queue::WaitQueue;
pub use session::SessionTable;
