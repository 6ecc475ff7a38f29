//! Result rows and sinks.
//!
//! The request pipeline streams rows into a caller-supplied [`RowSink`]:
//! either the opaque [`RowBuffer`], or a typed collector (`Vec<T>` for any
//! `T: FromRow`). Binary decoding is provided only for the scalar types the
//! driver itself needs; a full codec registry is a separate concern.

use bytes::Bytes;

use crate::error::{Error, Result};

/// One result row: raw binary cells in column order, `None` for SQL NULL.
#[derive(Debug, Clone, Default)]
pub struct Row {
    cells: Vec<Option<Bytes>>,
}

impl Row {
    pub(crate) fn from_cells(cells: Vec<Option<Bytes>>) -> Self {
        Self { cells }
    }

    /// Number of columns in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Raw binary value of a column, or `None` for SQL NULL / out of range.
    #[must_use]
    pub fn raw(&self, col: usize) -> Option<&[u8]> {
        self.cells.get(col).and_then(|c| c.as_deref())
    }

    /// Decode a column into `T`.
    ///
    /// # Errors
    ///
    /// [`Error::Decode`] when the column is out of range, NULL, or its bytes
    /// do not form a valid `T`.
    pub fn get<T: FromSql>(&self, col: usize) -> Result<T> {
        let cell = self
            .cells
            .get(col)
            .ok_or_else(|| Error::Decode(format!("column index {col} out of range")))?;
        let raw = cell
            .as_deref()
            .ok_or_else(|| Error::Decode(format!("unexpected NULL in column {col}")))?;
        T::from_sql(raw)
    }
}

/// Decode a value from its binary wire representation.
pub trait FromSql: Sized {
    /// Decode `raw` into `Self`.
    fn from_sql(raw: &[u8]) -> Result<Self>;
}

fn fixed<const N: usize>(raw: &[u8], what: &str) -> Result<[u8; N]> {
    raw.try_into()
        .map_err(|_| Error::Decode(format!("{what}: expected {N} bytes, got {}", raw.len())))
}

impl FromSql for bool {
    fn from_sql(raw: &[u8]) -> Result<Self> {
        let [b] = fixed::<1>(raw, "bool")?;
        Ok(b != 0)
    }
}

impl FromSql for i8 {
    fn from_sql(raw: &[u8]) -> Result<Self> {
        let [b] = fixed::<1>(raw, "\"char\"")?;
        Ok(b as i8)
    }
}

impl FromSql for i16 {
    fn from_sql(raw: &[u8]) -> Result<Self> {
        Ok(i16::from_be_bytes(fixed::<2>(raw, "int2")?))
    }
}

impl FromSql for i32 {
    fn from_sql(raw: &[u8]) -> Result<Self> {
        Ok(i32::from_be_bytes(fixed::<4>(raw, "int4")?))
    }
}

impl FromSql for i64 {
    fn from_sql(raw: &[u8]) -> Result<Self> {
        Ok(i64::from_be_bytes(fixed::<8>(raw, "int8")?))
    }
}

impl FromSql for u32 {
    fn from_sql(raw: &[u8]) -> Result<Self> {
        Ok(u32::from_be_bytes(fixed::<4>(raw, "oid")?))
    }
}

impl FromSql for String {
    fn from_sql(raw: &[u8]) -> Result<Self> {
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|e| Error::Decode(format!("text: {e}")))
    }
}

/// Build a value from a whole row.
pub trait FromRow: Sized {
    /// Decode `row` into `Self`.
    fn from_row(row: &Row) -> Result<Self>;
}

macro_rules! impl_from_row_for_tuple {
    ($($idx:tt: $ty:ident),+) => {
        impl<$($ty: FromSql),+> FromRow for ($($ty,)+) {
            fn from_row(row: &Row) -> Result<Self> {
                Ok(($(row.get::<$ty>($idx)?,)+))
            }
        }
    };
}

impl_from_row_for_tuple!(0: A);
impl_from_row_for_tuple!(0: A, 1: B);
impl_from_row_for_tuple!(0: A, 1: B, 2: C);
impl_from_row_for_tuple!(0: A, 1: B, 2: C, 3: D);

/// Destination for streamed result rows.
///
/// `append` is synchronous relative to the pipeline; back-pressure is
/// implicit. Returning an error fails the request with
/// [`Error::ResultProcess`] and marks the connection bad.
pub trait RowSink {
    /// Accept one row.
    fn append(&mut self, row: Row) -> Result<()>;
}

/// Opaque row buffer: collects rows without decoding them.
#[derive(Debug, Clone, Default)]
pub struct RowBuffer {
    rows: Vec<Row>,
}

impl RowBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate over the buffered rows.
    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// Drop all buffered rows, keeping the allocation.
    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

impl RowSink for RowBuffer {
    fn append(&mut self, row: Row) -> Result<()> {
        self.rows.push(row);
        Ok(())
    }
}

impl<T: FromRow> RowSink for Vec<T> {
    fn append(&mut self, row: Row) -> Result<()> {
        self.push(T::from_row(&row)?);
        Ok(())
    }
}
