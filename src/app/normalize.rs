use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::domain::action::{ModAction, TargetType};
use crate::infra::reddit::RawModAction;

/// How one source field maps into the canonical shape.
pub enum FieldMap {
    /// Plain rename: source key -> canonical key.
    Rename(&'static str),
    /// The value is a sub-object normalized with its own table.
    Nested(&'static Mapping),
}

pub type Mapping = [(&'static str, FieldMap)];

/// Source keys renamed into canonical names.
pub static MODLOG_MAPPING: &Mapping = &[
    ("mod", FieldMap::Rename("moderator")),
    ("action", FieldMap::Rename("mod_action")),
];

/// Internal source fields with no canonical counterpart.
pub static MODLOG_SKIP: &[&str] = &["mod_id36", "sr_id36", "subreddit_name_prefixed"];

/// Apply a mapping table to a raw object: drop skip-listed keys, rename
/// mapped keys, recurse into nested tables, pass everything else through.
/// Pure and deterministic; with empty tables it is the identity.
pub fn normalize_map(raw: &Map<String, Value>, mapping: &Mapping, skip: &[&str]) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in raw {
        if skip.contains(&key.as_str()) {
            continue;
        }
        match mapping.iter().find(|(from, _)| *from == key.as_str()) {
            Some((_, FieldMap::Rename(to))) => {
                out.insert((*to).to_string(), value.clone());
            }
            Some((_, FieldMap::Nested(inner))) => {
                let mapped = match value {
                    Value::Object(sub) => Value::Object(normalize_map(sub, *inner, skip)),
                    other => other.clone(),
                };
                out.insert(key.clone(), mapped);
            }
            None => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    out
}

/// Split a compound fullname (`"t3_abc123"`) into its target type and bare
/// id. Returns None when the fullname is absent or the prefix unknown, so
/// the two derived fields are always present together or not at all.
pub fn split_fullname(fullname: Option<&str>) -> Option<(TargetType, String)> {
    let fullname = fullname?;
    let (prefix, id) = fullname.split_once('_')?;
    let target_type = TargetType::from_prefix(prefix)?;
    if id.is_empty() {
        return None;
    }
    Some((target_type, id.to_string()))
}

/// Map one raw source record into the canonical record. Referentially
/// transparent: the same raw input always yields the same canonical output.
pub fn normalize(raw: &RawModAction) -> Result<ModAction> {
    let mapped = normalize_map(raw, MODLOG_MAPPING, MODLOG_SKIP);

    let id = required_str(&mapped, "id")?;
    let moderator = required_str(&mapped, "moderator")?;
    let subreddit = required_str(&mapped, "subreddit")?;
    let mod_action = required_str(&mapped, "mod_action")?;

    let epoch = mapped
        .get("created_utc")
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow!("modlog item {} missing created_utc", id))?;
    let created_utc = OffsetDateTime::from_unix_timestamp(epoch as i64)
        .map_err(|err| anyhow!("modlog item {} has invalid created_utc: {}", id, err))?;

    let target_fullname = opt_string(&mapped, "target_fullname");
    let (target_type, target_id) = match split_fullname(target_fullname.as_deref()) {
        Some((target_type, target_id)) => (Some(target_type), Some(target_id)),
        None => (None, None),
    };

    Ok(ModAction {
        id,
        created_utc,
        moderator,
        subreddit,
        mod_action,
        details: opt_string(&mapped, "details"),
        description: opt_string(&mapped, "description"),
        target_type,
        target_id,
        target_fullname,
        target_author: opt_string(&mapped, "target_author"),
        target_body: opt_string(&mapped, "target_body"),
        target_permalink: opt_string(&mapped, "target_permalink"),
        target_title: opt_string(&mapped, "target_title"),
        query_action: None,
    })
}

fn required_str(map: &Map<String, Value>, key: &str) -> Result<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("modlog item missing required field {}", key))
}

fn opt_string(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_item() -> RawModAction {
        let value = json!({
            "id": "ModAction_4f1b2c",
            "created_utc": 1_700_000_000.0,
            "mod": "shepherd",
            "subreddit": "pics",
            "action": "removecomment",
            "details": "remove",
            "description": null,
            "target_fullname": "t3_abc123",
            "target_author": "poster",
            "target_body": "a body",
            "target_permalink": "/r/pics/comments/abc123/",
            "target_title": "a title",
            "mod_id36": "x9z",
            "sr_id36": "2qh0u"
        });
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn renames_and_skips_source_fields() {
        let mapped = normalize_map(&raw_item(), MODLOG_MAPPING, MODLOG_SKIP);
        assert_eq!(mapped.get("moderator"), Some(&json!("shepherd")));
        assert_eq!(mapped.get("mod_action"), Some(&json!("removecomment")));
        assert!(mapped.get("mod").is_none());
        assert!(mapped.get("action").is_none());
        assert!(mapped.get("mod_id36").is_none());
        assert!(mapped.get("sr_id36").is_none());
    }

    #[test]
    fn nested_tables_recurse_into_sub_objects() {
        static INNER: &Mapping = &[("from", FieldMap::Rename("to"))];
        static OUTER: &Mapping = &[("sub", FieldMap::Nested(INNER))];
        let raw = match json!({"sub": {"from": 1, "keep": 2}, "top": 3}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let mapped = normalize_map(&raw, OUTER, &[]);
        assert_eq!(mapped.get("sub"), Some(&json!({"to": 1, "keep": 2})));
        assert_eq!(mapped.get("top"), Some(&json!(3)));
    }

    #[test]
    fn empty_tables_are_the_identity() {
        let raw = raw_item();
        let once = normalize_map(&raw, &[], &[]);
        let twice = normalize_map(&once, &[], &[]);
        assert_eq!(raw, once);
        assert_eq!(once, twice);
    }

    #[test]
    fn link_fullname_derives_type_and_id() {
        let action = normalize(&raw_item()).unwrap();
        assert_eq!(action.target_type, Some(TargetType::Link));
        assert_eq!(action.target_id.as_deref(), Some("abc123"));
        assert_eq!(action.target_fullname.as_deref(), Some("t3_abc123"));
    }

    #[test]
    fn normalize_is_deterministic() {
        let raw = raw_item();
        let first = normalize(&raw).unwrap();
        let second = normalize(&raw).unwrap();
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[test]
    fn unknown_prefix_leaves_both_derived_fields_absent() {
        let mut raw = raw_item();
        raw.insert("target_fullname".into(), json!("t9_zzz"));
        let action = normalize(&raw).unwrap();
        assert!(action.target_type.is_none());
        assert!(action.target_id.is_none());
        assert_eq!(action.target_fullname.as_deref(), Some("t9_zzz"));
    }

    #[test]
    fn missing_fullname_leaves_both_derived_fields_absent() {
        let mut raw = raw_item();
        raw.remove("target_fullname");
        let action = normalize(&raw).unwrap();
        assert!(action.target_type.is_none());
        assert!(action.target_id.is_none());
        assert!(action.target_fullname.is_none());
    }

    #[test]
    fn null_optionals_become_none() {
        let action = normalize(&raw_item()).unwrap();
        assert_eq!(action.details.as_deref(), Some("remove"));
        assert!(action.description.is_none());
    }
}
