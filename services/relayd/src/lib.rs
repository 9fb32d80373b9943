pub mod api;
pub mod auth;
pub mod client;
pub mod events;
pub mod http;
pub mod listener;
pub mod msg;
pub mod state;
pub mod websocket;

pub use state::ServerState;
