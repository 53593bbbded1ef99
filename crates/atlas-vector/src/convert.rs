//! Arrow cells to JSON values.
//!
//! Only the types datasets actually carry are mapped; anything else reads as
//! null rather than failing the whole query.
use arrow_array::cast::AsArray;
use arrow_array::types::{
    Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow_array::{Array, ArrowPrimitiveType, RecordBatch};
use arrow_schema::DataType;
use serde_json::Value;

use atlas_core::types::Fields;

fn primitive<T>(array: &dyn Array, i: usize) -> Value
where
    T: ArrowPrimitiveType,
    T::Native: Into<Value>,
{
    array.as_primitive_opt::<T>().map_or(Value::Null, |a| a.value(i).into())
}

fn list_items(values: &dyn Array) -> Value {
    Value::Array((0..values.len()).map(|j| value_at(values, j)).collect())
}

pub fn value_at(array: &dyn Array, i: usize) -> Value {
    if i >= array.len() || array.is_null(i) { return Value::Null; }
    match array.data_type() {
        DataType::Utf8 => array.as_string_opt::<i32>().map_or(Value::Null, |a| Value::from(a.value(i))),
        DataType::LargeUtf8 => array.as_string_opt::<i64>().map_or(Value::Null, |a| Value::from(a.value(i))),
        DataType::Boolean => array.as_boolean_opt().map_or(Value::Null, |a| Value::from(a.value(i))),
        DataType::Int8 => primitive::<Int8Type>(array, i),
        DataType::Int16 => primitive::<Int16Type>(array, i),
        DataType::Int32 => primitive::<Int32Type>(array, i),
        DataType::Int64 => primitive::<Int64Type>(array, i),
        DataType::UInt8 => primitive::<UInt8Type>(array, i),
        DataType::UInt16 => primitive::<UInt16Type>(array, i),
        DataType::UInt32 => primitive::<UInt32Type>(array, i),
        DataType::UInt64 => primitive::<UInt64Type>(array, i),
        DataType::Float32 => primitive::<Float32Type>(array, i),
        DataType::Float64 => primitive::<Float64Type>(array, i),
        DataType::List(_) => array.as_list_opt::<i32>().map_or(Value::Null, |a| list_items(a.value(i).as_ref())),
        DataType::LargeList(_) => array.as_list_opt::<i64>().map_or(Value::Null, |a| list_items(a.value(i).as_ref())),
        DataType::FixedSizeList(_, _) => array.as_fixed_size_list_opt().map_or(Value::Null, |a| list_items(a.value(i).as_ref())),
        DataType::Struct(_) => array.as_struct_opt().map_or(Value::Null, |a| {
            let fields: Fields = a
                .fields()
                .iter()
                .zip(a.columns())
                .map(|(f, col)| (f.name().clone(), value_at(col.as_ref(), i)))
                .collect();
            Value::Object(fields)
        }),
        _ => Value::Null,
    }
}

/// Reads the named column of row `i`; a missing column reads as null.
pub fn column_value(batch: &RecordBatch, name: &str, i: usize) -> Value {
    batch.column_by_name(name).map_or(Value::Null, |c| value_at(c.as_ref(), i))
}
