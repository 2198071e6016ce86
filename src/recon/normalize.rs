use crate::error::{GhReportError, Result};
use crate::recon::model::{Origin, Record};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

/// Dotted paths (`assignee.login`) locating canonical fields inside one raw API object.
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    pub key: &'static str,
    pub id: Option<&'static str>,
    pub display_name: Option<&'static str>,
    pub created_at: Option<&'static str>,
    pub last_activity_at: Option<&'static str>,
}

impl FieldMap {
    /// `GET /enterprises/{enterprise}/consumed-licenses` users.
    pub const ENTERPRISE_LICENSES: FieldMap = FieldMap {
        key: "github_com_login",
        id: None,
        display_name: Some("github_com_name"),
        created_at: Some("created_at"),
        last_activity_at: None,
    };

    /// `GET .../copilot/billing/seats` seat assignments.
    pub const COPILOT_SEATS: FieldMap = FieldMap {
        key: "assignee.login",
        id: Some("assignee.id"),
        display_name: Some("assignee.name"),
        created_at: Some("created_at"),
        last_activity_at: Some("last_activity_at"),
    };

    /// The serialized form of [`Record`] itself.
    #[cfg(test)]
    pub const CANONICAL: FieldMap = FieldMap {
        key: "key",
        id: Some("id"),
        display_name: Some("display_name"),
        created_at: Some("source_created_at"),
        last_activity_at: Some("last_activity_at"),
    };
}

/// A raw object that was skipped because it carried no usable identity.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedRecord {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// Sorted by key, keys unique.
    pub records: Vec<Record>,
    pub dropped: Vec<DroppedRecord>,
}

/// Map raw API objects onto canonical records.
///
/// Objects without a non-empty identity are dropped and reported in
/// [`Normalized::dropped`]. Two objects sharing an identity are an error:
/// the API promises unique logins, so a repeat means the input is corrupt.
pub fn normalize(raw: &[Value], origin: Origin, map: &FieldMap) -> Result<Normalized> {
    let mut records = Vec::with_capacity(raw.len());
    let mut dropped = Vec::new();

    for (index, value) in raw.iter().enumerate() {
        let key = match lookup(value, map.key).and_then(Value::as_str) {
            Some(key) if !key.trim().is_empty() => key.to_string(),
            _ => {
                dropped.push(DroppedRecord {
                    index,
                    reason: format!("missing or empty `{}`", map.key),
                });
                continue;
            }
        };

        records.push(Record {
            key,
            id: map.id.and_then(|path| lookup(value, path)).and_then(opaque_id),
            display_name: map
                .display_name
                .and_then(|path| lookup(value, path))
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            source_created_at: map.created_at.and_then(|path| timestamp(value, path)),
            last_activity_at: map.last_activity_at.and_then(|path| timestamp(value, path)),
            origin,
        });
    }

    records.sort_by(|a, b| a.key.cmp(&b.key));
    if let Some(pair) = records.windows(2).find(|pair| pair[0].key == pair[1].key) {
        return Err(GhReportError::DuplicateKey {
            origin,
            key: pair[0].key.clone(),
        });
    }

    Ok(Normalized { records, dropped })
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
        .filter(|v| !v.is_null())
}

fn opaque_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn timestamp(value: &Value, path: &str) -> Option<DateTime<Utc>> {
    let raw = lookup(value, path)?.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    tracing::debug!(field = path, value = raw, "ignoring unparseable timestamp");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn copilot_seats_read_nested_assignee() {
        let raw = vec![
            json!({
                "created_at": "2024-03-01T10:00:00Z",
                "last_activity_at": "2024-06-10T08:30:00+02:00",
                "assignee": { "login": "zoe_corp", "id": 42, "name": "Zoe" }
            }),
            json!({
                "created_at": "2024-03-02T10:00:00Z",
                "last_activity_at": null,
                "assignee": { "login": "adam_corp", "id": 7 }
            }),
        ];

        let out = normalize(&raw, Origin::Copilot, &FieldMap::COPILOT_SEATS).unwrap();
        assert!(out.dropped.is_empty());
        assert_eq!(out.records.len(), 2);

        let adam = &out.records[0];
        assert_eq!(adam.key, "adam_corp");
        assert_eq!(adam.id.as_deref(), Some("7"));
        assert!(adam.display_name.is_none());
        assert!(adam.last_activity_at.is_none());

        let zoe = &out.records[1];
        assert_eq!(zoe.key, "zoe_corp");
        assert_eq!(zoe.display_name.as_deref(), Some("Zoe"));
        assert_eq!(
            zoe.last_activity_at.unwrap().to_rfc3339(),
            "2024-06-10T06:30:00+00:00"
        );
        assert_eq!(zoe.origin, Origin::Copilot);
    }

    #[test]
    fn enterprise_users_read_flat_fields() {
        let raw = vec![json!({
            "github_com_login": "alice_corp",
            "github_com_name": "Alice",
            "license_type": "enterprise",
            "created_at": "2023-01-15"
        })];

        let out = normalize(&raw, Origin::Enterprise, &FieldMap::ENTERPRISE_LICENSES).unwrap();
        let alice = &out.records[0];
        assert_eq!(alice.key, "alice_corp");
        assert_eq!(alice.display_name.as_deref(), Some("Alice"));
        assert_eq!(
            alice.source_created_at.unwrap().format("%Y-%m-%d").to_string(),
            "2023-01-15"
        );
    }

    #[test]
    fn records_without_identity_are_dropped() {
        let raw = vec![
            json!({ "github_com_login": "bob_corp" }),
            json!({ "github_com_login": "" }),
            json!({ "github_com_name": "No Login" }),
            json!({ "github_com_login": null }),
        ];

        let out = normalize(&raw, Origin::Enterprise, &FieldMap::ENTERPRISE_LICENSES).unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.dropped.len(), 3);
        assert_eq!(out.dropped[0].index, 1);
        assert!(out.dropped[0].reason.contains("github_com_login"));
    }

    #[test]
    fn output_is_sorted_by_key() {
        let raw: Vec<Value> = ["charlie", "Bravo", "alpha", "_under"]
            .iter()
            .map(|login| json!({ "github_com_login": login }))
            .collect();

        let out = normalize(&raw, Origin::Enterprise, &FieldMap::ENTERPRISE_LICENSES).unwrap();
        let keys: Vec<&str> = out.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["Bravo", "_under", "alpha", "charlie"]);
    }

    #[test]
    fn duplicate_logins_are_rejected() {
        let raw = vec![
            json!({ "assignee": { "login": "dup" } }),
            json!({ "assignee": { "login": "other" } }),
            json!({ "assignee": { "login": "dup" } }),
        ];

        let err = normalize(&raw, Origin::Copilot, &FieldMap::COPILOT_SEATS).unwrap_err();
        match err {
            GhReportError::DuplicateKey { origin, key } => {
                assert_eq!(origin, Origin::Copilot);
                assert_eq!(key, "dup");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn normalizing_canonical_records_is_a_no_op() {
        let raw = vec![
            json!({
                "created_at": "2024-03-01T10:00:00Z",
                "last_activity_at": "2024-06-10T08:30:00Z",
                "assignee": { "login": "eve_corp", "id": 5, "name": "Eve" }
            }),
            json!({ "assignee": { "login": "dan_corp" } }),
        ];
        let first = normalize(&raw, Origin::Copilot, &FieldMap::COPILOT_SEATS).unwrap();

        let serialized: Vec<Value> = first
            .records
            .iter()
            .map(|r| serde_json::to_value(r).unwrap())
            .collect();
        let second = normalize(&serialized, Origin::Copilot, &FieldMap::CANONICAL).unwrap();

        assert_eq!(first.records, second.records);
        assert!(second.dropped.is_empty());
    }
}
