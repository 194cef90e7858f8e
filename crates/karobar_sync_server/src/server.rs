//! The reference server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::tables::ServerTables;
use karobar_sync_protocol::{Method, RemoteRequest, RemoteResponse};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;

/// A fault to apply to the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Answer with this status without touching any data.
    Status(u16),
    /// Apply the request, then drop the response.
    LoseResponse,
}

/// One handled request, as the server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    /// Request method.
    pub method: Method,
    /// Path and query.
    pub path: String,
    /// Status the server produced, even if the response was lost.
    pub status: u16,
}

/// The reference server.
///
/// Requests are handled synchronously and in-process; a client adapter
/// passes the bearer token and the [`RemoteRequest`] straight in.
///
/// # Example
///
/// ```
/// use karobar_sync_protocol::{endpoints, RemoteRequest};
/// use karobar_sync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default().with_auth(b"secret".to_vec()));
/// let token = server.issue_token("shop-1").unwrap();
///
/// let response = server
///     .handle(Some(&token), &RemoteRequest::get(endpoints::PARTIES))
///     .unwrap();
/// assert_eq!(response.status, 200);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
    faults: Mutex<VecDeque<Fault>>,
    log: Mutex<Vec<RequestRecord>>,
}

impl SyncServer {
    /// Creates a server with empty tables.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_tables(config, Arc::new(ServerTables::new()))
    }

    /// Creates a server over existing tables.
    pub fn with_tables(config: ServerConfig, tables: Arc<ServerTables>) -> Self {
        let context = Arc::new(HandlerContext::new(config, tables));
        let handler = RequestHandler::new(Arc::clone(&context));
        Self {
            handler,
            context,
            faults: Mutex::new(VecDeque::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Handles one request.
    ///
    /// Application errors come back as responses with the matching
    /// status. `Err` is only returned for [`Fault::LoseResponse`], after
    /// the request has taken effect.
    pub fn handle(&self, token: Option<&str>, request: &RemoteRequest) -> ServerResult<RemoteResponse> {
        let fault = self.faults.lock().pop_front();

        let response = match fault {
            Some(Fault::Status(status)) => {
                RemoteResponse::new(status, json!({ "message": "injected fault" }))
            }
            _ => match self
                .context
                .authenticate(token)
                .and_then(|business| self.handler.handle(&business, request))
            {
                Ok(response) => response,
                Err(err) => {
                    tracing::debug!(method = %request.method, path = %request.path, error = %err, "request refused");
                    err.to_response()
                }
            },
        };

        self.log.lock().push(RequestRecord {
            method: request.method,
            path: request.path.clone(),
            status: response.status,
        });

        if fault == Some(Fault::LoseResponse) {
            tracing::debug!(method = %request.method, path = %request.path, "dropping response");
            return Err(ServerError::ConnectionLost);
        }
        Ok(response)
    }

    /// Queues a fault for a future request. Faults apply in order.
    pub fn inject(&self, fault: Fault) {
        self.faults.lock().push_back(fault);
    }

    /// Issues a session token for `business_id`.
    pub fn issue_token(&self, business_id: &str) -> ServerResult<String> {
        self.context
            .validator()
            .ok_or_else(|| ServerError::InvalidRequest("authentication is disabled".into()))?
            .create_token(business_id)
    }

    /// Creates or updates a business profile.
    pub fn register_business(&self, business_id: &str, profile: Map<String, Value>) {
        self.context.tables.set_profile(business_id, profile);
    }

    /// Business used when authentication is disabled.
    pub fn default_business(&self) -> &str {
        &self.context.config.default_business
    }

    /// Entities of `collection` in `business_id`, ordered by id.
    pub fn entities(&self, business_id: &str, collection: &str) -> Vec<Value> {
        self.context.tables.read(business_id, |t| t.list(collection))
    }

    /// One entity.
    pub fn entity(&self, business_id: &str, collection: &str, id: &str) -> Option<Value> {
        self.context
            .tables
            .read(business_id, |t| t.get(collection, id).cloned())
    }

    /// Every request handled so far, oldest first.
    pub fn requests(&self) -> Vec<RequestRecord> {
        self.log.lock().clone()
    }

    /// Number of requests handled so far.
    pub fn request_count(&self) -> usize {
        self.log.lock().len()
    }

    /// The shared tables.
    pub fn tables(&self) -> &Arc<ServerTables> {
        &self.context.tables
    }
}
