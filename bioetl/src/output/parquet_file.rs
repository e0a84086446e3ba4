//! Parquet rendering, enabled by the `parquet` feature.

use crate::errors::{EtlError, Result};
use crate::record::{Table, Value};
use crate::schema::DataType;
use parquet::basic::{Compression, LogicalType, Repetition, Type as PhysicalType};
use parquet::data_type::{BoolType, ByteArray, ByteArrayType, DoubleType, Int64Type};
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::types::Type;
use std::sync::Arc;

fn write_err(e: ParquetError) -> EtlError {
    EtlError::write(format!("parquet: {e}"))
}

fn field(name: &str, dtype: DataType) -> std::result::Result<Type, ParquetError> {
    let builder = match dtype {
        DataType::Int64 => Type::primitive_type_builder(name, PhysicalType::INT64),
        DataType::Float64 => Type::primitive_type_builder(name, PhysicalType::DOUBLE),
        DataType::Bool => Type::primitive_type_builder(name, PhysicalType::BOOLEAN),
        DataType::String => Type::primitive_type_builder(name, PhysicalType::BYTE_ARRAY)
            .with_logical_type(Some(LogicalType::String)),
    };
    builder.with_repetition(Repetition::OPTIONAL).build()
}

/// File schema from the declared column types, independent of the data.
fn file_schema(columns: &[(String, DataType)]) -> std::result::Result<Type, ParquetError> {
    let fields = columns
        .iter()
        .map(|(name, dtype)| field(name, *dtype).map(Arc::new))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Type::group_type_builder("schema").with_fields(fields).build()
}

/// Present values plus definition levels; cells that do not fit the type count as null.
fn leveled<T>(values: &[&Value], convert: impl Fn(&Value) -> Option<T>) -> (Vec<T>, Vec<i16>) {
    let mut data = Vec::with_capacity(values.len());
    let mut levels = Vec::with_capacity(values.len());
    for &value in values {
        match convert(value) {
            Some(v) => {
                data.push(v);
                levels.push(1);
            }
            None => levels.push(0),
        }
    }
    (data, levels)
}

/// Renders `table` as a single-row-group Snappy Parquet file typed by `columns`.
///
/// # Errors
///
/// Returns `WRITE_ERROR` when encoding fails.
pub fn render(table: &Table, columns: &[(String, DataType)]) -> Result<Vec<u8>> {
    let schema = Arc::new(file_schema(columns).map_err(write_err)?);
    let props = Arc::new(
        WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build(),
    );

    let mut writer = SerializedFileWriter::new(Vec::new(), schema, props).map_err(write_err)?;
    let mut row_group = writer.next_row_group().map_err(write_err)?;
    let mut index = 0;
    while let Some(mut column) = row_group.next_column().map_err(write_err)? {
        let (name, dtype) = &columns[index];
        let values: Vec<&Value> = table.column_values(name).collect();

        match dtype {
            DataType::Int64 => {
                let (data, levels) = leveled(&values, Value::as_i64);
                column.typed::<Int64Type>().write_batch(&data, Some(&levels), None)
            }
            DataType::Float64 => {
                let (data, levels) = leveled(&values, Value::as_f64);
                column.typed::<DoubleType>().write_batch(&data, Some(&levels), None)
            }
            DataType::Bool => {
                let (data, levels) = leveled(&values, |v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                });
                column.typed::<BoolType>().write_batch(&data, Some(&levels), None)
            }
            DataType::String => {
                let (data, levels) = leveled(&values, |v| v.to_cell().map(|s| ByteArray::from(s.as_str())));
                column.typed::<ByteArrayType>().write_batch(&data, Some(&levels), None)
            }
        }
        .map_err(write_err)?;
        column.close().map_err(write_err)?;
        index += 1;
    }
    row_group.close().map_err(write_err)?;
    writer.into_inner().map_err(write_err)
}
