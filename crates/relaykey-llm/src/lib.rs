//! Multi-provider chat completions through the Portkey AI gateway.
//!
//! Maps a provider name (google, openai, anthropic, groq) to its default model
//! and gateway virtual key, then delegates the call to the gateway's
//! OpenAI-compatible chat-completions endpoint. Provides the
//! `CompletionBackend` trait, `HttpGateway`, a middleware chain and
//! `GatewayClient`.

mod client;
mod config;
pub mod demos;
mod gateway;
mod provider;
mod types;

pub use client::*;
pub use config::*;
pub use gateway::*;
pub use provider::*;
pub use types::*;
