use arrow_array::cast::AsArray;
use arrow_array::types::{Date32Type, Float64Type, Int32Type, TimestampNanosecondType};
use arrow_array::Array;
use arrow_schema::DataType;
use orc_core::arrow_conversion::{batch_to_record_batch, schema_to_arrow};
use orc_core::engine::{ColumnSelection, FileReader, NativeFileReader, RowReaderOptions};
use orc_core::*;
use std::rc::Rc;

use test_helpers::*;

#[test]
fn test_file_batches_export_to_arrow() {
    let schema: TypeDescription =
        "struct<id:int,name:string,score:double,born:date,seen:timestamp,tags:map<string,int>>"
            .parse()
            .unwrap();
    let seen = jiff::Timestamp::from_second(1_000)
        .unwrap()
        .to_zoned(jiff::tz::TimeZone::UTC);
    let rows = vec![
        OrcValue::Tuple(vec![
            OrcValue::from(1),
            OrcValue::from("ada"),
            OrcValue::from(9.5),
            OrcValue::from(jiff::civil::date(1970, 1, 3)),
            OrcValue::from(seen),
            OrcValue::Map(vec![(OrcValue::from("x"), OrcValue::from(1))]),
        ]),
        OrcValue::Null,
        OrcValue::Tuple(vec![
            OrcValue::from(3),
            OrcValue::Null,
            OrcValue::Null,
            OrcValue::Null,
            OrcValue::Null,
            OrcValue::Map(vec![]),
        ]),
    ];
    let bytes = write_rows(schema.clone(), &rows).unwrap();

    let file = Rc::new(NativeFileReader::open(bytes).unwrap());
    let mut row_reader = file
        .create_row_reader(RowReaderOptions::default())
        .unwrap();
    let mut batch = row_reader.create_row_batch(16);
    assert!(row_reader.next(&mut batch).unwrap());

    let record_batch = batch_to_record_batch(row_reader.selected_type(), &batch).unwrap();
    assert_eq!(record_batch.num_rows(), 3);
    assert_eq!(
        record_batch.schema().fields().len(),
        schema_to_arrow(&schema).unwrap().fields().len()
    );

    let ids = record_batch.column(0).as_primitive::<Int32Type>();
    assert_eq!(ids.value(0), 1);
    assert!(ids.is_null(1));
    assert_eq!(ids.value(2), 3);

    let names = record_batch.column(1).as_string::<i32>();
    assert_eq!(names.value(0), "ada");
    assert!(names.is_null(2));

    let scores = record_batch.column(2).as_primitive::<Float64Type>();
    assert_eq!(scores.value(0), 9.5);

    let born = record_batch.column(3).as_primitive::<Date32Type>();
    assert_eq!(born.value(0), 2);

    let seen = record_batch
        .column(4)
        .as_primitive::<TimestampNanosecondType>();
    assert_eq!(seen.value(0), 1_000_000_000_000);

    let tags = record_batch.column(5).as_map();
    assert_eq!(tags.value_length(0), 1);
    assert!(tags.is_null(1));
    assert_eq!(tags.value_length(2), 0);
    assert!(matches!(record_batch.column(5).data_type(), DataType::Map(_, false)));
}

#[test]
fn test_projected_batches_export_selected_fields() {
    let bytes = write_rows(create_test_schema(), &generate_test_rows(5)).unwrap();
    let file = Rc::new(NativeFileReader::open(bytes).unwrap());
    let mut row_reader = file
        .create_row_reader(
            RowReaderOptions::default()
                .with_columns(ColumnSelection::Names(vec!["name".into(), "active".into()])),
        )
        .unwrap();
    let mut batch = row_reader.create_row_batch(5);
    assert!(row_reader.next(&mut batch).unwrap());

    let record_batch = batch_to_record_batch(row_reader.selected_type(), &batch).unwrap();
    let schema = record_batch.schema();
    let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    assert_eq!(names, vec!["name", "active"]);
    assert!(record_batch.column(1).as_boolean().value(2));
}
