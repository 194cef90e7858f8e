//! Store metadata: the bootstrap marker.

use crate::error::{CoreError, CoreResult};
use crate::store::{LocalStore, Transaction};
use crate::types::{Document, META};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Key of the bootstrap marker in the `meta` collection.
pub const LAST_SYNC: &str = "last_sync";

/// When the store was last seeded from the remote, if ever.
pub fn last_sync(store: &LocalStore) -> CoreResult<Option<DateTime<Utc>>> {
    let Some(doc) = store.get(META, LAST_SYNC)? else {
        return Ok(None);
    };
    let raw = doc
        .get("value")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::invalid_format("last_sync marker has no value"))?;
    let at = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| CoreError::invalid_format(format!("last_sync marker: {e}")))?;
    Ok(Some(at.with_timezone(&Utc)))
}

/// Writes the bootstrap marker inside `txn`, which must include `meta`.
pub fn record_last_sync(txn: &mut Transaction<'_>, at: DateTime<Utc>) -> CoreResult<()> {
    let mut doc = Document::new();
    doc.insert("key".into(), Value::from(LAST_SYNC));
    doc.insert(
        "value".into(),
        Value::from(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    txn.put(META, doc)?;
    Ok(())
}
