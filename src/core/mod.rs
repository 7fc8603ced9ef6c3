pub mod agent;
pub mod chat_stream;
pub mod config;
pub mod conversation;
pub mod decoder;
pub mod message;
pub mod mock;
pub mod providers;
pub mod relay;
pub mod session;
pub mod store;
pub mod stream;
pub mod throttle;
