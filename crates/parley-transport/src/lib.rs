//! # Parley Transport
//!
//! HTTP plumbing for Parley apps, selected through feature flags:
//!
//! - `http-client`: [`ConnectorClient`], the outbound [`ActivitySender`]
//!   talking to the conversation's `serviceUrl`
//! - `http-server` (default): [`HttpPlugin`], the inbound webhook endpoint.
//!   Implies `http-client`, which it uses for replies and streaming.
//!
//! ```text
//! platform ──POST /api/messages──▶ HttpPlugin ──emit──▶ App
//!    ▲                                                   │
//!    └──────── POST/PUT v3/conversations/… ◀── ConnectorClient
//! ```
//!
//! [`ActivitySender`]: parley_core::ActivitySender

pub mod error;

#[cfg(feature = "http-client")]
pub mod client;

#[cfg(feature = "http-server")]
pub mod server;

pub use error::{TransportError, TransportResult};

#[cfg(feature = "http-client")]
pub use client::{ConnectorClient, activities_url};

#[cfg(feature = "http-server")]
pub use server::{HttpPlugin, HttpSettings};
