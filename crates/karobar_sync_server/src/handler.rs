//! Request handlers for the Remote API endpoints.

use crate::auth::{AuthConfig, TokenValidator};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::tables::ServerTables;
use karobar_sync_protocol::{endpoints, Method, RemoteRequest, RemoteResponse};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Key of the business profile in the bootstrap snapshot.
const CURRENT_BUSINESS: &str = "current_business";

/// A collection endpoint and what a valid entity must carry.
struct Route {
    endpoint: &'static str,
    collection: &'static str,
    required: &'static [&'static str],
}

const ROUTES: [Route; 4] = [
    Route {
        endpoint: endpoints::PARTIES,
        collection: "parties",
        required: &["name"],
    },
    Route {
        endpoint: endpoints::PRODUCTS,
        collection: "products",
        required: &["name", "baseUnitId"],
    },
    Route {
        endpoint: endpoints::UNITS,
        collection: "units",
        required: &["name"],
    },
    Route {
        endpoint: endpoints::COMPANIES,
        collection: "companies",
        required: &["name"],
    },
];

/// State shared by every handler.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Entity tables.
    pub tables: Arc<ServerTables>,
    validator: Option<TokenValidator>,
}

impl HandlerContext {
    /// Creates a handler context.
    pub fn new(config: ServerConfig, tables: Arc<ServerTables>) -> Self {
        let validator = match (&config.auth_secret, config.require_auth) {
            (Some(secret), true) => Some(TokenValidator::new(
                AuthConfig::new(secret.clone()).with_expiry(config.token_expiry),
            )),
            _ => None,
        };
        Self {
            config,
            tables,
            validator,
        }
    }

    /// Token validator, when authentication is on.
    pub fn validator(&self) -> Option<&TokenValidator> {
        self.validator.as_ref()
    }

    /// Resolves the business a request acts for.
    pub fn authenticate(&self, token: Option<&str>) -> ServerResult<String> {
        if !self.config.require_auth {
            return Ok(self.config.default_business.clone());
        }
        let validator = self
            .validator
            .as_ref()
            .ok_or_else(|| ServerError::Internal("auth required but no secret set".into()))?;
        let token = token.ok_or_else(|| ServerError::Unauthorized("missing token".into()))?;
        validator.validate_token(token)
    }
}

/// Dispatches requests to the endpoint handlers.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles `request` on behalf of `business`.
    pub fn handle(&self, business: &str, request: &RemoteRequest) -> ServerResult<RemoteResponse> {
        let (path, query_id) = endpoints::split_target(&request.path);

        if path == endpoints::SYNC {
            return match request.method {
                Method::Get => self.handle_snapshot(business),
                _ => Err(unknown_route(request.method, path)),
            };
        }

        let route = ROUTES
            .iter()
            .find(|r| r.endpoint == path)
            .ok_or_else(|| unknown_route(request.method, path))?;

        match request.method {
            Method::Get => self.handle_list(business, route),
            Method::Post => self.handle_create(business, route, request.body.as_ref()),
            Method::Put => self.handle_update(business, route, request.body.as_ref()),
            Method::Delete => self.handle_delete(business, route, query_id),
        }
    }

    fn handle_list(&self, business: &str, route: &Route) -> ServerResult<RemoteResponse> {
        let rows = self
            .context
            .tables
            .read(business, |t| t.list(route.collection));
        Ok(RemoteResponse::new(200, json!({ route.collection: rows })))
    }

    fn handle_create(
        &self,
        business: &str,
        route: &Route,
        body: Option<&Value>,
    ) -> ServerResult<RemoteResponse> {
        let (id, entity) = validate(business, route, body, "ID required")?;
        self.context
            .tables
            .write(business, |t| t.insert(route.collection, &id, entity.clone()))?;
        tracing::debug!(business, collection = route.collection, id, "created");
        Ok(RemoteResponse::new(
            201,
            json!({ "message": "Synced", "data": entity }),
        ))
    }

    fn handle_update(
        &self,
        business: &str,
        route: &Route,
        body: Option<&Value>,
    ) -> ServerResult<RemoteResponse> {
        let (id, entity) = validate(business, route, body, "ID required for update")?;
        self.context
            .tables
            .write(business, |t| t.replace(route.collection, &id, entity.clone()))?;
        tracing::debug!(business, collection = route.collection, id, "updated");
        Ok(RemoteResponse::new(
            200,
            json!({ "message": "Updated", "data": entity }),
        ))
    }

    fn handle_delete(
        &self,
        business: &str,
        route: &Route,
        id: Option<String>,
    ) -> ServerResult<RemoteResponse> {
        let id = id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ServerError::InvalidRequest("ID required".into()))?;
        let existed = self
            .context
            .tables
            .write(business, |t| t.remove(route.collection, &id));
        tracing::debug!(business, collection = route.collection, id, existed, "deleted");
        Ok(RemoteResponse::new(
            200,
            json!({ "message": "Deleted successfully" }),
        ))
    }

    fn handle_snapshot(&self, business: &str) -> ServerResult<RemoteResponse> {
        self.context.tables.read(business, |t| {
            let mut profile = match &t.profile {
                Some(Value::Object(profile)) => profile.clone(),
                _ => return Err(ServerError::NotFound {
                    collection: "business".into(),
                    id: business.to_string(),
                }),
            };
            profile.insert("id".into(), Value::String(CURRENT_BUSINESS.into()));
            Ok(RemoteResponse::new(
                200,
                json!({
                    "business": profile,
                    "products": t.list("products"),
                    "parties": t.list("parties"),
                    "units": t.list("units"),
                    "companies": t.list("companies"),
                }),
            ))
        })
    }
}

fn unknown_route(method: Method, path: &str) -> ServerError {
    ServerError::UnknownRoute {
        method: method.to_string(),
        path: path.to_string(),
    }
}

/// Checks a POST/PUT body and returns its id and the entity to store.
fn validate(
    business: &str,
    route: &Route,
    body: Option<&Value>,
    missing_id: &str,
) -> ServerResult<(String, Value)> {
    let body: &Map<String, Value> = body
        .and_then(Value::as_object)
        .ok_or_else(|| ServerError::InvalidRequest("body must be a JSON object".into()))?;

    let id = match body.get("_id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        _ => return Err(ServerError::InvalidRequest(missing_id.to_string())),
    };

    for field in route.required {
        let present = match body.get(*field) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        };
        if !present {
            return Err(ServerError::InvalidRequest(format!("{field} is required")));
        }
    }

    let mut entity = body.clone();
    entity.insert("businessId".into(), Value::String(business.to_string()));
    Ok((id, Value::Object(entity)))
}
