//! LanBeam node — the receiving server and its lifecycle.
//!
//! `Node::start` brings up discovery (multicast plus subnet scan), the
//! protocol HTTP server, and the session sweeper; `Node::stop` tears them
//! down in that order. Transfer acceptance and progress reach the host
//! through the [`events::TransferObserver`] callbacks.

pub mod events;
pub mod node;
pub mod routes;
pub mod session;
pub mod state;
pub mod tls;

pub use events::{CompletionInfo, ProgressEvent, TransferObserver};
pub use node::{Node, NodeStatus};
pub use session::{SessionError, SessionManager};
pub use state::AppState;
