//! # Parley Core
//!
//! The data model and collaborator contracts shared by every Parley crate.
//!
//! ## Contents
//!
//! - **Activity model**: the [`Activity`] envelope and its parts
//!   ([`ChannelAccount`], [`ConversationAccount`], [`Attachment`], [`Entity`])
//! - **Addressing**: [`ConversationReference`], the minimal tuple needed to
//!   send into a conversation without the original inbound activity
//! - **Responses**: [`InvokeResponse`] (what the remote platform sees) and
//!   [`ResourceResponse`] (what a send/update returns)
//! - **Collaborators**: [`ActivitySender`] and [`CredentialProvider`], the
//!   only two capabilities the dispatch pipeline needs from the outside world
//!
//! ```text
//! ┌─────────────┐  Activity   ┌────────────┐  Activity   ┌────────────────┐
//! │  Transport  │────────────▶│    Host    │────────────▶│ ActivitySender │
//! │  (plugin)   │◀────────────│ (pipeline) │◀────────────│  (transport)   │
//! └─────────────┘ Invoke-     └────────────┘ Resource-   └────────────────┘
//!                 Response                   Response
//! ```

pub mod activity;
pub mod credentials;
pub mod error;
pub mod reference;
pub mod response;
pub mod sender;

pub use activity::{
    Activity, ActivityType, Attachment, ChannelAccount, ConversationAccount, Entity,
};
pub use credentials::{BoxedCredentialProvider, CredentialProvider, Token};
pub use error::{ActivityError, ApiError, ApiResult, CredentialError};
pub use reference::ConversationReference;
pub use response::{InvokeResponse, ResourceResponse, SentActivity};
pub use sender::{ActivitySender, BoxedSender};
