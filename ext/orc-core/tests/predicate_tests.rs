use bytes::Bytes;
use orc_core::engine::sarg::ColumnRef;
use orc_core::*;

use test_helpers::*;

/// 100 rows in row groups of 10: id = row, bucket = row / 10, price = row / 4
fn indexed_file() -> Bytes {
    let rows: Vec<OrcValue> = (0..100i64)
        .map(|i| {
            OrcValue::Tuple(vec![
                OrcValue::from(i),
                OrcValue::from(format!("bucket{}", i / 10)),
                OrcValue::Decimal(Decimal::new(i * 25, 2)),
            ])
        })
        .collect();
    write_rows_with(
        WriterBuilder::new().with_row_index_stride(10),
        "struct<id:int,bucket:string,price:decimal(8,2)>".parse().unwrap(),
        &rows,
    )
    .unwrap()
}

fn ids(reader: Reader) -> Vec<i64> {
    reader
        .map(|row| match row.unwrap() {
            OrcValue::Tuple(fields) => match fields[0] {
                OrcValue::Integer(i) => i,
                ref other => panic!("unexpected id {:?}", other),
            },
            other => panic!("unexpected row {:?}", other),
        })
        .collect()
}

fn filtered(predicate: Predicate) -> Vec<i64> {
    ids(Reader::builder()
        .with_predicate(predicate)
        .build(indexed_file())
        .unwrap())
}

#[test]
fn test_equality_reads_one_row_group() {
    let id = PredicateColumn::named(TypeKind::Int, "id").unwrap();
    assert_eq!(filtered(id.eq(23)), (20..30).collect::<Vec<_>>());
}

#[test]
fn test_range_predicates() {
    let id = PredicateColumn::named(TypeKind::Int, "id").unwrap();
    let expected: Vec<i64> = (0..10).chain(90..100).collect();
    assert_eq!(filtered(id.lt(5) | id.ge(95)), expected);
    assert_eq!(filtered(id.gt(89)), (90..100).collect::<Vec<_>>());
    assert_eq!(filtered(id.ge(40) & id.le(41)), (40..50).collect::<Vec<_>>());
    assert!(filtered(id.gt(1000)).is_empty());
}

#[test]
fn test_negation_and_strings() {
    let bucket = PredicateColumn::named(TypeKind::String, "bucket").unwrap();
    assert_eq!(filtered(bucket.eq("bucket7")), (70..80).collect::<Vec<_>>());
    assert!(filtered(bucket.eq("bucket77")).is_empty());

    let id = PredicateColumn::named(TypeKind::Int, "id").unwrap();
    let expected: Vec<i64> = (10..100).collect();
    assert_eq!(filtered(!id.lt(10)), expected);
}

#[test]
fn test_predicate_by_column_id() {
    let id = PredicateColumn::with_id(TypeKind::Int, 1).unwrap();
    assert_eq!(filtered(id.eq(55)), (50..60).collect::<Vec<_>>());
}

#[test]
fn test_decimal_predicate() {
    let price = PredicateColumn::decimal(ColumnRef::Name("price".into()), 8, 2).unwrap();
    // 12.50 is the price of row 50
    let literal: Decimal = "12.5".parse().unwrap();
    assert_eq!(filtered(price.eq(literal)), (50..60).collect::<Vec<_>>());
}

#[test]
fn test_seek_within_filtered_rows() {
    let id = PredicateColumn::named(TypeKind::Int, "id").unwrap();
    let mut reader = Reader::builder()
        .with_predicate(id.eq(35))
        .with_batch_size(3)
        .build(indexed_file())
        .unwrap();
    reader.seek(0, Whence::Start).unwrap();
    assert_eq!(ids(reader), (30..40).collect::<Vec<_>>());
}

#[test]
fn test_unknown_column_is_rejected() {
    let missing = PredicateColumn::named(TypeKind::Int, "missing").unwrap();
    let result = Reader::builder()
        .with_predicate(missing.eq(1))
        .build(indexed_file());
    assert!(matches!(result, Err(OrcError::Type(_))));

    let out_of_range = PredicateColumn::with_id(TypeKind::Int, 42).unwrap();
    let result = Reader::builder()
        .with_predicate(out_of_range.eq(1))
        .build(indexed_file());
    assert!(matches!(result, Err(OrcError::Type(_))));
}

#[test]
fn test_invalid_predicate_columns() {
    assert!(matches!(
        PredicateColumn::named(TypeKind::Struct, "s"),
        Err(OrcError::Type(_))
    ));
    assert!(matches!(
        PredicateColumn::named(TypeKind::Decimal, "price"),
        Err(OrcError::Value(_))
    ));
    assert!(PredicateColumn::decimal(ColumnRef::Id(3), 2, 5).is_err());
}

fn at(seconds: i64, nanos: i32) -> OrcValue {
    OrcValue::from(
        jiff::Timestamp::new(seconds, nanos)
            .unwrap()
            .to_zoned(jiff::tz::TimeZone::UTC),
    )
}

#[test]
fn test_sub_millisecond_timestamp_predicates() {
    let schema: TypeDescription = "struct<id:int,ts:timestamp>".parse().unwrap();
    let bytes = write_rows(
        schema,
        &[OrcValue::Tuple(vec![OrcValue::from(1), at(1, 900_000)])],
    )
    .unwrap();
    let read = |predicate: Predicate| {
        ids(Reader::builder()
            .with_predicate(predicate)
            .build(bytes.clone())
            .unwrap())
    };

    let ts = PredicateColumn::named(TypeKind::Timestamp, "ts").unwrap();
    assert_eq!(read(ts.gt(at(1, 500_000))), vec![1]);
    assert_eq!(read(ts.ge(at(1, 900_000))), vec![1]);
    assert_eq!(read(ts.eq(at(1, 900_000))), vec![1]);
    assert_eq!(read(ts.lt(at(1, 950_000))), vec![1]);
    assert_eq!(read(ts.le(at(1, 900_000))), vec![1]);
    assert!(read(ts.gt(at(1, 999_999))).is_empty());
    assert!(read(ts.lt(at(1, 0))).is_empty());
    assert!(read(ts.gt(at(2, 0))).is_empty());
}
