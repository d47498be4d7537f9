pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod provider;
pub mod store;

pub use config::LumenConfig;
pub use error::LumenError;
pub use models::ChatRecord;
pub use provider::{
    create_backend, CompletionBackend, MistralClient, ProviderError, QwenClient,
    PROVIDER_ERROR_SENTINEL,
};
pub use store::{ChatStore, PgChatStore, StoreError};
