//! Binding result rows back into fresh record instances.

use crate::connection::RowSet;
use crate::error::{OrmError, Result};
use crate::record::Record;
use crate::statement::StatementKind;
use crate::value::Value;

/// Bind one row positionally into a blank instance shaped like `sample`.
///
/// The row must carry exactly one column per field, in declaration order.
pub fn bind_row<R: Record>(sample: &R, kind: StatementKind, row: Vec<Value>) -> Result<R> {
    let mut record = sample.blank();
    let expected = record.field_names().len();
    if row.len() != expected {
        return Err(OrmError::ScanFailed {
            kind,
            table: sample.type_name().to_string(),
            message: format!("expected {expected} columns, got {}", row.len()),
        });
    }
    for (idx, value) in row.into_iter().enumerate() {
        record.set_field_at(idx, value).map_err(|err| OrmError::ScanFailed {
            kind,
            table: sample.type_name().to_string(),
            message: err.to_string(),
        })?;
    }
    Ok(record)
}

/// Bind every row of `rows`, preserving result-set order.
///
/// When the executor reports column names they must match the field names
/// position by position, ASCII case ignored.
pub fn bind_rows<R: Record>(sample: &R, kind: StatementKind, rows: RowSet) -> Result<Vec<R>> {
    let expected = sample.field_names();
    if !rows.columns.is_empty() && !columns_line_up(&rows.columns, &expected) {
        return Err(OrmError::ScanFailed {
            kind,
            table: sample.type_name().to_string(),
            message: format!(
                "result columns ({}) do not line up with fields ({})",
                rows.columns.join(", "),
                expected.join(", ")
            ),
        });
    }
    rows.rows
        .into_iter()
        .map(|row| bind_row(sample, kind, row))
        .collect()
}

fn columns_line_up<S: AsRef<str>>(columns: &[String], fields: &[S]) -> bool {
    columns.len() == fields.len()
        && columns
            .iter()
            .zip(fields)
            .all(|(column, field)| column.eq_ignore_ascii_case(field.as_ref()))
}
