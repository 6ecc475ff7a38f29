//! Benchmark queries.

use pg_client::{Error, FromRow, Query, Row};

/// The trivial round-trip query.
pub const SIMPLE_QUERY: &str = "SELECT 1";

/// Catalog query with a composite predicate and twelve projected columns.
pub const COMPLEX_QUERY: &str = "SELECT typname, typnamespace, typowner, typlen, typbyval, \
     typcategory, typispreferred, typisdefined, typdelim, typrelid, typelem, typarray \
     FROM pg_type WHERE typtypmod = $1 AND typisdefined = $2";

const INT4_OID: u32 = 23;
const BOOL_OID: u32 = 16;

/// Which of the two benchmark queries to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum QueryKind {
    /// `SELECT 1`.
    Simple,
    /// The twelve-column `pg_type` query.
    Complex,
}

impl QueryKind {
    /// Build the query with its bound parameters.
    pub fn build(self) -> Query {
        match self {
            QueryKind::Simple => Query::new(SIMPLE_QUERY),
            QueryKind::Complex => Query::new(COMPLEX_QUERY)
                .param(INT4_OID, Some((-1i32).to_be_bytes().to_vec()))
                .param(BOOL_OID, Some(vec![1])),
        }
    }

    /// Stable name for reports.
    pub fn name(self) -> &'static str {
        match self {
            QueryKind::Simple => "simple",
            QueryKind::Complex => "complex",
        }
    }
}

/// A row of the complex query, decoded from binary.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)] // read as a whole by the parse scenarios
pub struct PgType {
    pub typname: String,
    pub typnamespace: u32,
    pub typowner: u32,
    pub typlen: i16,
    pub typbyval: bool,
    pub typcategory: i8,
    pub typispreferred: bool,
    pub typisdefined: bool,
    pub typdelim: i8,
    pub typrelid: u32,
    pub typelem: u32,
    pub typarray: u32,
}

impl FromRow for PgType {
    fn from_row(row: &Row) -> Result<Self, Error> {
        Ok(Self {
            typname: row.get(0)?,
            typnamespace: row.get(1)?,
            typowner: row.get(2)?,
            typlen: row.get(3)?,
            typbyval: row.get(4)?,
            typcategory: row.get(5)?,
            typispreferred: row.get(6)?,
            typisdefined: row.get(7)?,
            typdelim: row.get(8)?,
            typrelid: row.get(9)?,
            typelem: row.get(10)?,
            typarray: row.get(11)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_query_text() {
        let query = QueryKind::Simple.build();
        assert_eq!(query.text(), "SELECT 1");
        assert!(query.params().is_empty());
    }

    #[test]
    fn test_complex_query_params() {
        let query = QueryKind::Complex.build();
        assert!(query.text().contains("FROM pg_type"));
        assert_eq!(query.param_oids(), &[INT4_OID, BOOL_OID]);
        assert_eq!(
            query.params()[0].as_deref(),
            Some(&(-1i32).to_be_bytes()[..])
        );
        assert_eq!(query.params()[1].as_deref(), Some(&[1u8][..]));
    }
}
