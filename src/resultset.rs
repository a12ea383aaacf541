//! Eagerly materialised result sets with local cursor operations.

use std::collections::HashMap;

use crate::protocol::response::Field;
use crate::value::Value;

/// A buffered result set.
///
/// Rows are fully materialised before the caller sees the set, so every
/// cursor operation is a local index manipulation and never touches the
/// connection.
#[derive(Debug)]
pub struct ResultSet {
    fields: Vec<Field>,
    rows: Vec<Vec<Value>>,
    cursor: usize,
    field_cursor: usize,
    last_fetched: Option<usize>,
}

impl ResultSet {
    pub(crate) fn new(mut fields: Vec<Field>, rows: Vec<Vec<Value>>) -> Self {
        for row in &rows {
            for (field, value) in fields.iter_mut().zip(row) {
                field.max_length = field.max_length.max(value.byte_len());
            }
        }
        Self {
            fields,
            rows,
            cursor: 0,
            field_cursor: 0,
            last_fetched: None,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Next row in cursor order, advancing the cursor.
    pub fn fetch_row(&mut self) -> Option<&[Value]> {
        let row = self.rows.get(self.cursor)?;
        self.last_fetched = Some(self.cursor);
        self.cursor += 1;
        Some(row)
    }

    /// Next row projected as a column-name → value map.
    pub fn fetch_hash(&mut self) -> Option<HashMap<String, Value>> {
        let row = self.rows.get(self.cursor)?;
        self.last_fetched = Some(self.cursor);
        self.cursor += 1;
        Some(
            self.fields
                .iter()
                .zip(row)
                .map(|(f, v)| (f.name.clone(), v.clone()))
                .collect(),
        )
    }

    /// Byte lengths of the last fetched row; None if nothing has been
    /// fetched since the last seek.
    pub fn fetch_lengths(&self) -> Option<Vec<usize>> {
        let row = self.rows.get(self.last_fetched?)?;
        Some(row.iter().map(|v| v.byte_len()).collect())
    }

    /// Move the cursor to an absolute row offset.
    pub fn data_seek(&mut self, offset: usize) {
        self.cursor = offset.min(self.rows.len());
        self.last_fetched = None;
    }

    /// Current cursor position.
    pub fn row_tell(&self) -> usize {
        self.cursor
    }

    /// Set the cursor, returning the previous position.
    pub fn row_seek(&mut self, position: usize) -> usize {
        let previous = self.cursor;
        self.data_seek(position);
        previous
    }

    /// Row at an absolute index, without moving the cursor.
    pub fn row(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(|r| r.as_slice())
    }

    pub fn fetch_fields(&self) -> &[Field] {
        &self.fields
    }

    /// Next field in field-cursor order.
    pub fn fetch_field(&mut self) -> Option<&Field> {
        let field = self.fields.get(self.field_cursor)?;
        self.field_cursor += 1;
        Some(field)
    }

    pub fn fetch_field_direct(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn field_tell(&self) -> usize {
        self.field_cursor
    }

    /// Set the field cursor, returning the previous position.
    pub fn field_seek(&mut self, position: usize) -> usize {
        let previous = self.field_cursor;
        self.field_cursor = position.min(self.fields.len());
        previous
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Vec<Value>;
    type IntoIter = std::slice::Iter<'a, Vec<Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
