//! Row decoding with a worker-local qualifier cache.

use crate::column::ColumnSpec;
use crate::error::{ScanError, ScanResult};
use crate::store::StoreRow;
use bytes::Bytes;
use ferry_plan::Value;
use std::collections::HashMap;

/// Turns store rows into value records in column order.
///
/// Owned by one worker. `family:qualifier` names are split once and cached
/// for the life of the decoder.
#[derive(Debug)]
pub struct RowDecoder {
    columns: Vec<ColumnSpec>,
    constants: Vec<Option<Value>>,
    qualifiers: HashMap<String, (Bytes, Bytes)>,
}

impl RowDecoder {
    /// Creates a decoder, converting constant columns up front.
    pub fn new(columns: Vec<ColumnSpec>) -> ScanResult<Self> {
        let constants = columns
            .iter()
            .map(ColumnSpec::constant_value)
            .collect::<ScanResult<Vec<_>>>()?;
        Ok(Self {
            columns,
            constants,
            qualifiers: HashMap::new(),
        })
    }

    /// Configured columns.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Number of cached `family:qualifier` names.
    pub fn cached_qualifiers(&self) -> usize {
        self.qualifiers.len()
    }

    /// Decodes one row.
    pub fn decode(&mut self, row: &StoreRow) -> ScanResult<Vec<Value>> {
        let mut record = Vec::with_capacity(self.columns.len());
        for (column, constant) in self.columns.iter().zip(&self.constants) {
            if let Some(value) = constant {
                record.push(value.clone());
                continue;
            }
            if column.is_rowkey() {
                record.push(column.decode(Some(&row.key()[..]))?);
                continue;
            }

            if !self.qualifiers.contains_key(&column.name) {
                let parsed = split_qualifier(&column.name)?;
                self.qualifiers.insert(column.name.clone(), parsed);
            }
            let (family, qualifier) = &self.qualifiers[&column.name];
            record.push(column.decode(row.cell(family, qualifier).map(|v| &v[..]))?);
        }
        Ok(record)
    }
}

fn split_qualifier(name: &str) -> ScanResult<(Bytes, Bytes)> {
    let (family, qualifier) = name
        .split_once(':')
        .ok_or_else(|| ScanError::decode(name, "expected family:qualifier"))?;
    Ok((
        Bytes::copy_from_slice(family.trim().as_bytes()),
        Bytes::copy_from_slice(qualifier.trim().as_bytes()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;

    fn row() -> StoreRow {
        StoreRow::new("user#1")
            .with_cell("info", "age", 30i32.to_be_bytes().to_vec())
            .with_cell("info", "name", "ada")
    }

    #[test]
    fn decodes_in_column_order() {
        let mut decoder = RowDecoder::new(vec![
            ColumnSpec::new("info:name", ColumnType::String),
            ColumnSpec::new("rowkey", ColumnType::String),
            ColumnSpec::new("info: age ", ColumnType::Int),
            ColumnSpec::new("info:missing", ColumnType::Long),
            ColumnSpec::new("source", ColumnType::String).with_constant("crm"),
        ])
        .unwrap();

        let record = decoder.decode(&row()).unwrap();
        assert_eq!(
            record,
            vec![
                Value::Text("ada".into()),
                Value::Text("user#1".into()),
                Value::Int(30),
                Value::Null,
                Value::Text("crm".into()),
            ]
        );
    }

    #[test]
    fn qualifier_names_are_cached_once() {
        let mut decoder = RowDecoder::new(vec![
            ColumnSpec::new("info:name", ColumnType::String),
            ColumnSpec::new("info:age", ColumnType::Int),
        ])
        .unwrap();

        for _ in 0..3 {
            decoder.decode(&row()).unwrap();
        }
        assert_eq!(decoder.cached_qualifiers(), 2);
    }

    #[test]
    fn name_without_family_is_rejected() {
        let mut decoder =
            RowDecoder::new(vec![ColumnSpec::new("name", ColumnType::String)]).unwrap();
        assert!(matches!(
            decoder.decode(&row()),
            Err(ScanError::ColumnDecode { .. })
        ));
    }

    #[test]
    fn bad_constant_fails_construction() {
        let err = RowDecoder::new(vec![
            ColumnSpec::new("k", ColumnType::BinaryString).with_constant("x")
        ])
        .unwrap_err();
        assert!(matches!(err, ScanError::UnsupportedColumnType(_)));
    }
}
