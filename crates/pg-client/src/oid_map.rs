//! Server type OID map.
//!
//! User-defined types have server-assigned OIDs that differ between
//! databases. A connection configured with registered type names resolves
//! them once, right after connect, with an internal catalog request on the
//! fresh connection.

use std::collections::HashMap;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::row::{Row, RowSink};

/// Mapping from registered type names to their server OIDs.
#[derive(Debug, Clone, Default)]
pub struct OidMap {
    entries: HashMap<String, u32>,
}

impl OidMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no types are mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of mapped types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The server OID of a registered type, if resolved.
    #[must_use]
    pub fn oid_of(&self, type_name: &str) -> Option<u32> {
        self.entries.get(type_name).copied()
    }

    pub(crate) fn insert(&mut self, type_name: String, oid: u32) {
        self.entries.insert(type_name, oid);
    }
}

/// Collects `(oid, typname)` pairs for the registered names only.
struct OidRows<'a> {
    wanted: &'a [String],
    found: Vec<(String, u32)>,
}

impl RowSink for OidRows<'_> {
    fn append(&mut self, row: Row) -> Result<()> {
        let oid: u32 = row.get(0)?;
        let name: String = row.get(1)?;
        if self.wanted.iter().any(|w| *w == name) {
            self.found.push((name, oid));
        }
        Ok(())
    }
}

/// Resolve `registered_types` on a freshly connected `conn`.
///
/// The caller bounds the whole connect operation; this request deliberately
/// carries no constraint of its own.
pub(crate) async fn populate(conn: &mut Connection, registered_types: &[String]) -> Result<()> {
    let query = Query::new("SELECT oid, typname FROM pg_type");
    let mut sink = OidRows {
        wanted: registered_types,
        found: Vec::new(),
    };
    let outcome = crate::request::drive(conn, &query, &mut sink).await;
    if let Err(e) = outcome {
        conn.mark_bad();
        return Err(Error::OidMapRequestFailed(e.to_string()));
    }

    for name in registered_types {
        if !sink.found.iter().any(|(n, _)| n == name) {
            conn.mark_bad();
            return Err(Error::OidMapRequestFailed(format!(
                "type '{name}' not found in pg_type"
            )));
        }
    }
    for (name, oid) in sink.found {
        conn.oid_map_mut().insert(name, oid);
    }
    tracing::debug!(types = registered_types.len(), "type oid map populated");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_map() {
        let map = OidMap::new();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
        assert_eq!(map.oid_of("hstore"), None);
    }

    #[test]
    fn test_lookup_after_insert() {
        let mut map = OidMap::new();
        map.insert("hstore".to_string(), 16462);
        map.insert("citext".to_string(), 16500);
        assert_eq!(map.len(), 2);
        assert_eq!(map.oid_of("hstore"), Some(16462));
        assert_eq!(map.oid_of("citext"), Some(16500));
        assert_eq!(map.oid_of("ltree"), None);
    }

    #[test]
    fn test_oid_rows_sink_filters_unregistered() {
        let wanted = vec!["hstore".to_string()];
        let mut sink = OidRows {
            wanted: &wanted,
            found: Vec::new(),
        };
        let mk = |oid: u32, name: &str| {
            Row::from_cells(vec![
                Some(bytes::Bytes::copy_from_slice(&oid.to_be_bytes())),
                Some(bytes::Bytes::copy_from_slice(name.as_bytes())),
            ])
        };
        sink.append(mk(23, "int4")).unwrap();
        sink.append(mk(16462, "hstore")).unwrap();
        assert_eq!(sink.found, vec![("hstore".to_string(), 16462)]);
    }
}
