//! Raw entries, batch operations and date-range queries.

use chrono::{DateTime, Utc};
use estuary_types::{keys, time, FieldMap};
use serde_json::Value;

/// A generic identity-keyed record from the backing store, pre-parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    pub id: String,
    pub fields: FieldMap,
}

impl ListEntry {
    pub fn new(id: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// The entry's canonical timestamp, if it carries one.
    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.fields
            .get(keys::DATE)
            .and_then(Value::as_i64)
            .and_then(time::from_millis)
    }
}

/// One operation inside an atomic batch write.
#[derive(Debug, Clone)]
pub enum BatchOp {
    /// Create or overwrite an entry.
    Insert { id: String, fields: FieldMap },
    /// Merge fields into an existing entry.
    Update { id: String, fields: FieldMap },
    /// Remove an entry.
    Delete { id: String },
}

/// A date-range query over one collection.
///
/// Results are ordered ascending by the `date` field, with `from`
/// exclusive and `to` inclusive. With `from` set, `limit` keeps the
/// first results after the lower bound; with only `to` set, it keeps
/// the last results ending at the upper bound.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StoreQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl StoreQuery {
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            limit: None,
        }
    }

    pub fn from(from: DateTime<Utc>, limit: usize) -> Self {
        Self {
            from: Some(from),
            to: None,
            limit: Some(limit),
        }
    }

    pub fn to(to: DateTime<Utc>, limit: usize) -> Self {
        Self {
            from: None,
            to: Some(to),
            limit: Some(limit),
        }
    }
}

/// Applies a query to a collection snapshot in arrival order.
///
/// Shared by drivers whose backends cannot evaluate the range natively.
/// Entries without a `date` field are not addressable by a date query
/// and are skipped. The sort is stable, so entries with equal dates
/// keep their arrival order.
pub fn apply_query(entries: Vec<ListEntry>, query: &StoreQuery) -> Vec<ListEntry> {
    let mut dated: Vec<(i64, ListEntry)> = entries
        .into_iter()
        .filter_map(|e| e.date().map(|d| (time::to_millis(d), e)))
        .collect();
    dated.sort_by_key(|(millis, _)| *millis);

    let mut selected: Vec<ListEntry> = dated
        .into_iter()
        .filter(|(millis, _)| {
            let after_from = query
                .from
                .map_or(true, |from| *millis > time::to_millis(from));
            let within_to = query.to.map_or(true, |to| *millis <= time::to_millis(to));
            after_from && within_to
        })
        .map(|(_, e)| e)
        .collect();

    if let Some(limit) = query.limit {
        if query.from.is_some() {
            selected.truncate(limit);
        } else if query.to.is_some() && selected.len() > limit {
            selected.drain(..selected.len() - limit);
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, millis: i64) -> ListEntry {
        let mut fields = FieldMap::new();
        fields.insert(keys::DATE.to_string(), Value::from(millis));
        ListEntry::new(id, fields)
    }

    fn date(millis: i64) -> DateTime<Utc> {
        time::from_millis(millis).unwrap()
    }

    fn ids(entries: &[ListEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn from_is_exclusive_to_is_inclusive() {
        let entries = vec![
            entry("a", 1),
            entry("b", 2),
            entry("c", 3),
            entry("d", 4),
            entry("e", 5),
        ];
        let result = apply_query(entries, &StoreQuery::between(date(2), date(4)));
        assert_eq!(ids(&result), ["c", "d"]);
    }

    #[test]
    fn from_with_limit_keeps_the_first_results() {
        let entries = vec![
            entry("a", 1),
            entry("b", 2),
            entry("c", 3),
            entry("d", 4),
            entry("e", 5),
        ];
        let result = apply_query(entries, &StoreQuery::from(date(2), 2));
        assert_eq!(ids(&result), ["c", "d"]);
    }

    #[test]
    fn to_with_limit_keeps_the_last_results_ascending() {
        let entries = vec![
            entry("a", 1),
            entry("b", 2),
            entry("c", 3),
            entry("d", 4),
            entry("e", 5),
        ];
        let result = apply_query(entries, &StoreQuery::to(date(4), 2));
        assert_eq!(ids(&result), ["c", "d"]);
    }

    #[test]
    fn equal_dates_keep_arrival_order() {
        let entries = vec![entry("first", 7), entry("second", 7), entry("third", 7)];
        let result = apply_query(entries, &StoreQuery::to(date(7), 10));
        assert_eq!(ids(&result), ["first", "second", "third"]);
    }

    #[test]
    fn undated_entries_are_not_addressable() {
        let entries = vec![entry("a", 1), ListEntry::new("no-date", FieldMap::new())];
        let result = apply_query(entries, &StoreQuery::to(date(5), 10));
        assert_eq!(ids(&result), ["a"]);
    }
}
