pub mod bridge;
pub mod config;
pub mod conversation;
pub mod credentials;
pub mod disclaimer;
pub mod error;
pub mod integration;
pub mod logging;
pub mod models;
pub mod provider;
pub mod retry;
pub mod transport;
pub mod validation;

pub use crate::config::Config;
pub use crate::error::{IntegrationError, Result};
pub use crate::integration::{Integration, IntegrationState};
pub use crate::models::{Entity, MessagePayload, MessageResponse, Options, Transcript, Turn};
pub use crate::provider::ProviderKind;
