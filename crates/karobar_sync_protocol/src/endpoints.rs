//! Remote API paths.

use url::form_urlencoded;

/// Party collection endpoint.
pub const PARTIES: &str = "/api/parties";
/// Product collection endpoint.
pub const PRODUCTS: &str = "/api/products";
/// Unit collection endpoint.
pub const UNITS: &str = "/api/units";
/// Company collection endpoint.
pub const COMPANIES: &str = "/api/companies";
/// Consolidated bootstrap snapshot.
pub const SYNC: &str = "/api/sync";

/// Every per-kind collection endpoint.
pub const ALL: [&str; 4] = [PARTIES, PRODUCTS, UNITS, COMPANIES];

/// Builds the DELETE target for `id` on `endpoint`.
///
/// The identifier travels in the query string; the request has no body.
///
/// ```
/// use karobar_sync_protocol::endpoints;
///
/// assert_eq!(
///     endpoints::delete_target(endpoints::PARTIES, "a/b"),
///     "/api/parties?id=a%2Fb"
/// );
/// ```
#[must_use]
pub fn delete_target(endpoint: &str, id: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("id", id)
        .finish();
    format!("{endpoint}?{query}")
}

/// Splits a target into its path and the value of its `id` parameter.
#[must_use]
pub fn split_target(target: &str) -> (&str, Option<String>) {
    match target.split_once('?') {
        None => (target, None),
        Some((path, query)) => {
            let id = form_urlencoded::parse(query.as_bytes())
                .find(|(k, _)| k == "id")
                .map(|(_, v)| v.into_owned());
            (path, id)
        }
    }
}
