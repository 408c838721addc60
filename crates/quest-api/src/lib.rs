pub mod admin;
pub mod auth;
pub mod config;
pub mod error;
pub mod friends;
pub mod middleware;
pub mod notifications;
pub mod notify;
pub mod pagination;
pub mod rewards;
pub mod router;
pub mod security;
pub mod state;
pub mod tasks;
pub mod token;
pub mod users;
pub mod validation;
pub mod ws;

pub use config::AppConfig;
pub use router::router;
pub use state::{AppState, AppStateInner};
