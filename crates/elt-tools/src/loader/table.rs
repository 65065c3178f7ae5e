//! In-memory CSV table.

use std::io::{Read, Write};

use crate::error::PipelineError;
use crate::loader::header::normalize_headers;
use crate::schema::TableSchema;

/// A header row plus string cells. An empty cell is null.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Result of projecting a table onto a schema.
#[derive(Debug, Clone)]
pub struct Projection {
    pub table: RawTable,
    /// Nullable schema fields absent from the source, emitted as null.
    pub filled: Vec<&'static str>,
    /// Source columns with no schema field, dropped.
    pub dropped: Vec<String>,
}

impl RawTable {
    /// Read a CSV with a header row, normalizing the headers.
    ///
    /// Short rows are padded with nulls, long rows keep their extra cells
    /// until projection drops them.
    pub fn read_csv<R: Read>(reader: R) -> Result<Self, PipelineError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = normalize_headers(rdr.headers()?.iter())?;

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            if row.len() < headers.len() {
                row.resize(headers.len(), String::new());
            }
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    /// Index of a column by normalized name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cells of one column.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| row[idx].as_str()))
    }

    /// Replace a column's values, appending the column if it does not exist.
    /// `None` is written as null.
    pub fn set_column(&mut self, name: &str, values: Vec<Option<String>>) {
        let idx = match self.column_index(name) {
            Some(idx) => idx,
            None => {
                self.headers.push(name.to_string());
                for row in &mut self.rows {
                    row.resize(self.headers.len(), String::new());
                }
                self.headers.len() - 1
            }
        };

        for (row, value) in self.rows.iter_mut().zip(values) {
            row[idx] = value.unwrap_or_default();
        }
    }

    /// Select and reorder columns to exactly the schema's field order.
    pub fn project(&self, schema: &TableSchema) -> Result<Projection, PipelineError> {
        let mut indices = Vec::with_capacity(schema.fields.len());
        let mut filled = Vec::new();

        for field in &schema.fields {
            match self.column_index(field.name) {
                Some(idx) => indices.push(Some(idx)),
                None if field.required => {
                    return Err(PipelineError::MissingRequiredColumn {
                        table: schema.name.to_string(),
                        column: field.name.to_string(),
                    });
                }
                None => {
                    filled.push(field.name);
                    indices.push(None);
                }
            }
        }

        let dropped = self
            .headers
            .iter()
            .filter(|h| schema.field(h).is_none())
            .cloned()
            .collect();

        let rows = self
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|idx| idx.map(|i| row[i].clone()).unwrap_or_default())
                    .collect()
            })
            .collect();

        Ok(Projection {
            table: RawTable {
                headers: schema.field_names().into_iter().map(String::from).collect(),
                rows,
            },
            filled,
            dropped,
        })
    }

    /// Write the header row followed by every data row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), PipelineError> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
