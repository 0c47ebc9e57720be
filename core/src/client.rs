//! Session-aware client for the Mini App API.
//!
//! # Design
//! `SessionClient` owns the in-memory session, the `SessionStore` that
//! mirrors it, and the `Transport` that executes requests. Every operation is
//! split into a `build_*` method that produces an `HttpRequest` and a
//! `parse_*` method that consumes an `HttpResponse`. The convenience methods
//! (`list_items`, `create_item`, ...) run build, execute and parse in
//! sequence, so a host that wants to do its own I/O can call the halves
//! directly.
//!
//! The client is Anonymous until `authenticate` or `restore_session`
//! succeeds. Resource calls made while Anonymous fail with
//! `ClientError::NotAuthenticated` before anything reaches the transport.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Operation};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::session::Session;
use crate::store::SessionStore;
use crate::transport::Transport;
use crate::types::{AuthRequest, AuthResponse, CreateItem, DeleteResult, Item, ItemId, UpdateItem, User};

const AUTH_PATH: &str = "/api/v1/auth/telegram";
const PROFILE_PATH: &str = "/api/v1/user/profile";
const ITEMS_PATH: &str = "/api/v1/items";

const JSON_CONTENT_TYPE: (&str, &str) = ("content-type", "application/json");

/// Client for the Mini App backend that keeps the user signed in.
#[derive(Debug)]
pub struct SessionClient<S, T> {
    base_url: String,
    store: S,
    transport: T,
    session: Option<Session>,
}

impl<S: SessionStore, T: Transport> SessionClient<S, T> {
    pub fn new(base_url: &str, store: S, transport: T) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
            transport,
            session: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn token(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.token.as_str())
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Exchange the host-supplied init data for a session.
    ///
    /// On success the session is persisted (replacing any stored record) and
    /// becomes the client's current session. On failure the previous session,
    /// in memory and in the store, is left as it was.
    pub fn authenticate(&mut self, init_data: &str) -> Result<&Session, ClientError> {
        let request = self.build_authenticate(init_data)?;
        let response = self.transport.execute(request)?;
        self.complete_authenticate(response)
    }

    pub fn build_authenticate(&self, init_data: &str) -> Result<HttpRequest, ClientError> {
        let body = AuthRequest {
            init_data: init_data.to_string(),
        };
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: self.url(AUTH_PATH),
            headers: vec![header(JSON_CONTENT_TYPE)],
            body: Some(to_json(&body)?),
        })
    }

    /// Parse the authentication response and install the session.
    pub fn complete_authenticate(&mut self, response: HttpResponse) -> Result<&Session, ClientError> {
        if !response.is_success() {
            warn!(status = response.status, "Authentication rejected");
            return Err(ClientError::authentication(response.status, &response.body));
        }
        let auth: AuthResponse = from_json(&response.body)?;
        let session = Session {
            token: auth.token,
            user: auth.user,
        };
        session.save(&self.store)?;
        info!(user_id = session.user.id, "Authenticated");
        Ok(&*self.session.insert(session))
    }

    /// Load the persisted session, if there is a complete and readable one.
    ///
    /// Makes no network call. A missing key or a malformed profile returns
    /// `false` and leaves the client Anonymous, dropping any session it held,
    /// since the store no longer backs it.
    pub fn restore_session(&mut self) -> bool {
        match Session::load(&self.store) {
            Some(session) => {
                debug!(user_id = session.user.id, "Session restored");
                self.session = Some(session);
                true
            }
            None => {
                debug!("No persisted session");
                self.session = None;
                false
            }
        }
    }

    /// Drop the session from memory and from the store.
    ///
    /// Safe to call when signed out. The in-memory session is cleared even if
    /// the store then fails.
    pub fn logout(&mut self) -> Result<(), ClientError> {
        if self.session.take().is_some() {
            info!("Logged out");
        }
        Session::clear(&self.store)?;
        Ok(())
    }

    /// Headers attached to every authenticated request.
    pub fn auth_headers(&self) -> Result<Vec<(String, String)>, ClientError> {
        let session = self.session.as_ref().ok_or(ClientError::NotAuthenticated)?;
        Ok(vec![
            ("authorization".to_string(), session.bearer()),
            header(JSON_CONTENT_TYPE),
        ])
    }

    // -----------------------------------------------------------------------
    // Resource operations
    // -----------------------------------------------------------------------

    pub fn get_profile(&self) -> Result<User, ClientError> {
        let request = self.build_get_profile()?;
        self.parse_get_profile(self.execute(request)?)
    }

    pub fn list_items(&self) -> Result<Vec<Item>, ClientError> {
        let request = self.build_list_items()?;
        self.parse_list_items(self.execute(request)?)
    }

    pub fn get_item(&self, id: &ItemId) -> Result<Item, ClientError> {
        let request = self.build_get_item(id)?;
        self.parse_get_item(self.execute(request)?)
    }

    pub fn create_item(&self, title: &str, description: &str) -> Result<Item, ClientError> {
        let input = CreateItem {
            title: title.to_string(),
            description: description.to_string(),
        };
        let request = self.build_create_item(&input)?;
        self.parse_create_item(self.execute(request)?)
    }

    pub fn update_item(&self, id: &ItemId, patch: &UpdateItem) -> Result<Item, ClientError> {
        let request = self.build_update_item(id, patch)?;
        self.parse_update_item(self.execute(request)?)
    }

    pub fn delete_item(&self, id: &ItemId) -> Result<DeleteResult, ClientError> {
        let request = self.build_delete_item(id)?;
        self.parse_delete_item(self.execute(request)?)
    }

    // -----------------------------------------------------------------------
    // Request builders
    // -----------------------------------------------------------------------

    pub fn build_get_profile(&self) -> Result<HttpRequest, ClientError> {
        self.authorized(HttpMethod::Get, PROFILE_PATH.to_string(), None)
    }

    pub fn build_list_items(&self) -> Result<HttpRequest, ClientError> {
        self.authorized(HttpMethod::Get, ITEMS_PATH.to_string(), None)
    }

    pub fn build_get_item(&self, id: &ItemId) -> Result<HttpRequest, ClientError> {
        self.authorized(HttpMethod::Get, item_path(id), None)
    }

    pub fn build_create_item(&self, input: &CreateItem) -> Result<HttpRequest, ClientError> {
        self.authorized(HttpMethod::Post, ITEMS_PATH.to_string(), Some(to_json(input)?))
    }

    pub fn build_update_item(&self, id: &ItemId, patch: &UpdateItem) -> Result<HttpRequest, ClientError> {
        self.authorized(HttpMethod::Put, item_path(id), Some(to_json(patch)?))
    }

    pub fn build_delete_item(&self, id: &ItemId) -> Result<HttpRequest, ClientError> {
        self.authorized(HttpMethod::Delete, item_path(id), None)
    }

    // -----------------------------------------------------------------------
    // Response parsers
    // -----------------------------------------------------------------------

    pub fn parse_get_profile(&self, response: HttpResponse) -> Result<User, ClientError> {
        parse(Operation::GetProfile, response)
    }

    pub fn parse_list_items(&self, response: HttpResponse) -> Result<Vec<Item>, ClientError> {
        check_status(Operation::ListItems, &response)?;
        // The backend encodes an empty list as `null`.
        let items: Option<Vec<Item>> = from_json(&response.body)?;
        Ok(items.unwrap_or_default())
    }

    pub fn parse_get_item(&self, response: HttpResponse) -> Result<Item, ClientError> {
        parse(Operation::GetItem, response)
    }

    pub fn parse_create_item(&self, response: HttpResponse) -> Result<Item, ClientError> {
        parse(Operation::CreateItem, response)
    }

    pub fn parse_update_item(&self, response: HttpResponse) -> Result<Item, ClientError> {
        parse(Operation::UpdateItem, response)
    }

    pub fn parse_delete_item(&self, response: HttpResponse) -> Result<DeleteResult, ClientError> {
        parse(Operation::DeleteItem, response)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(
        &self,
        method: HttpMethod,
        path: String,
        body: Option<String>,
    ) -> Result<HttpRequest, ClientError> {
        Ok(HttpRequest {
            method,
            url: self.url(&path),
            headers: self.auth_headers()?,
            body,
        })
    }

    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        debug!(method = %request.method, url = %request.url, "Sending request");
        self.transport.execute(request)
    }
}

fn item_path(id: &ItemId) -> String {
    format!("{ITEMS_PATH}/{id}")
}

fn header((name, value): (&str, &str)) -> (String, String) {
    (name.to_string(), value.to_string())
}

/// Map a non-2xx status to a `Request` error for `operation`.
fn check_status(operation: Operation, response: &HttpResponse) -> Result<(), ClientError> {
    if response.is_success() {
        return Ok(());
    }
    debug!(%operation, status = response.status, "Request rejected");
    Err(ClientError::request(operation, response.status, &response.body))
}

fn parse<D: DeserializeOwned>(operation: Operation, response: HttpResponse) -> Result<D, ClientError> {
    check_status(operation, &response)?;
    from_json(&response.body)
}

fn to_json<V: Serialize>(value: &V) -> Result<String, ClientError> {
    serde_json::to_string(value).map_err(|e| ClientError::Serialization(e.to_string()))
}

fn from_json<D: DeserializeOwned>(body: &str) -> Result<D, ClientError> {
    serde_json::from_str(body).map_err(|e| ClientError::Deserialization(e.to_string()))
}
