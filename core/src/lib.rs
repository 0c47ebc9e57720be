//! Blocking client for a Telegram Mini App backend.
//!
//! # Overview
//! Exchanges the host-supplied init data for a bearer token and user profile,
//! keeps that session in an injected key-value store, and performs CRUD on
//! the backend's items with the token attached.
//!
//! # Design
//! - `SessionClient` holds the base URL, a `SessionStore`, a `Transport` and
//!   the current `Session` (if any). Token and profile live in one
//!   `Option<Session>`, so they are present or absent together.
//! - Each operation is split into `build_*` (produces request) and `parse_*`
//!   (consumes response); the convenience methods join them through the
//!   transport, and hosts that do their own I/O can call the halves.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod error;
pub mod http;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

pub use client::SessionClient;
pub use error::{ClientError, Operation};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use session::{Session, TOKEN_KEY, USER_KEY};
pub use store::{FileStore, MemoryStore, SessionStore, StoreError};
pub use transport::{Transport, UreqTransport};
pub use types::{AuthRequest, AuthResponse, CreateItem, DeleteResult, Item, ItemId, UpdateItem, User};
