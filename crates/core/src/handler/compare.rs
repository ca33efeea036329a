//! Field-level comparison of remote and local records.
//!
//! Records are compared through their serde object form, so every handler
//! shares one comparison routine and only declares which fields to skip.

use serde_json::{Map, Value};

use crate::media::MediaItem;
use crate::registry::Import;

/// Catalog art, skipped when the remote item brings none.
pub const ART_FIELD: &str = "art";

/// Playback state, skipped when the import does not take it from the source.
pub const PLAYBACK_FIELD: &str = "playback";

/// Fields excluded from comparison for one remote item: the handler's own
/// ignore set plus the fields this import or this item leaves to the catalog.
pub fn ignored_fields(
    handler_ignores: &[&'static str],
    import: &Import,
    remote: &MediaItem,
) -> Vec<&'static str> {
    let mut fields = handler_ignores.to_vec();
    if remote.art().is_empty() {
        fields.push(ART_FIELD);
    }
    if remote.playback().is_some() && !import.settings.update_playback_metadata_from_source {
        fields.push(PLAYBACK_FIELD);
    }
    fields
}

/// Names of the fields whose values differ, skipping `ignore`.
pub fn differences(
    remote: &MediaItem,
    local: &MediaItem,
    ignore: &[&str],
) -> Result<Vec<String>, serde_json::Error> {
    let remote = to_object(remote)?;
    let local = to_object(local)?;

    let mut changed: Vec<String> = remote
        .iter()
        .filter(|(field, _)| !ignore.contains(&field.as_str()))
        .filter(|(field, value)| local.get(*field) != Some(*value))
        .map(|(field, _)| field.clone())
        .collect();

    for field in local.keys() {
        if !remote.contains_key(field) && !ignore.contains(&field.as_str()) {
            changed.push(field.clone());
        }
    }

    changed.sort();
    Ok(changed)
}

/// Copy the given fields from the local record into the remote one.
pub fn carry_forward(
    remote: &mut MediaItem,
    local: &MediaItem,
    fields: &[&str],
) -> Result<(), serde_json::Error> {
    if fields.is_empty() {
        return Ok(());
    }

    let mut merged = to_object(remote)?;
    let local = to_object(local)?;
    for field in fields {
        match local.get(*field) {
            Some(value) => {
                merged.insert((*field).to_string(), value.clone());
            }
            None => {
                merged.remove(*field);
            }
        }
    }

    *remote = serde_json::from_value(Value::Object(merged))?;
    Ok(())
}

fn to_object(item: &MediaItem) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(item)? {
        Value::Object(map) => Ok(map),
        other => Ok(Map::from_iter([("value".to_string(), other)])),
    }
}
