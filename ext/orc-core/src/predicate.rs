//! Row-group filter predicates
//!
//! Predicates are written against [`PredicateColumn`]s and combined with `&`,
//! `|` and `!`:
//!
//! ```
//! use orc_core::predicate::PredicateColumn;
//! use orc_core::types::TypeKind;
//!
//! let x = PredicateColumn::named(TypeKind::Int, "x").unwrap();
//! let name = PredicateColumn::named(TypeKind::String, "name").unwrap();
//! let predicate = x.gt(10) & !name.eq("skip");
//! ```
//!
//! [`compile`] lowers a predicate into the [`SearchArgument`] the storage
//! engine evaluates against row-group statistics.

use crate::converter::ConverterOptions;
use crate::engine::sarg::{ColumnRef, Literal, PredicateDataType, SearchArgumentBuilder};
use crate::engine::stats::timestamp_nanos;
use crate::engine::SearchArgument;
use crate::types::{TypeDescription, TypeKind};
use crate::{OrcError, OrcValue, Result};
use std::ops::{BitAnd, BitOr, Not};

/// A typed column reference usable in predicates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateColumn {
    kind: TypeKind,
    column: ColumnRef,
    precision: u32,
    scale: u32,
}

impl PredicateColumn {
    /// Column of a non-decimal kind, by dotted name or column id
    pub fn new(kind: TypeKind, column: ColumnRef) -> Result<Self> {
        match kind {
            TypeKind::Binary
            | TypeKind::List
            | TypeKind::Map
            | TypeKind::Union
            | TypeKind::Struct => Err(OrcError::type_error(format!(
                "Unsupported predicate column type: {}",
                kind.name()
            ))),
            TypeKind::Decimal => Err(OrcError::value(
                "Decimal predicate columns need a precision and a scale",
            )),
            _ => Ok(Self {
                kind,
                column,
                precision: 0,
                scale: 0,
            }),
        }
    }

    pub fn named<S: Into<String>>(kind: TypeKind, name: S) -> Result<Self> {
        Self::new(kind, ColumnRef::Name(name.into()))
    }

    pub fn with_id(kind: TypeKind, column_id: u64) -> Result<Self> {
        Self::new(kind, ColumnRef::Id(column_id))
    }

    pub fn decimal(column: ColumnRef, precision: u32, scale: u32) -> Result<Self> {
        if precision == 0 || precision > 38 || scale > precision {
            return Err(OrcError::value(format!(
                "Invalid decimal predicate column: decimal({},{})",
                precision, scale
            )));
        }
        Ok(Self {
            kind: TypeKind::Decimal,
            column,
            precision,
            scale,
        })
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn column(&self) -> &ColumnRef {
        &self.column
    }

    pub fn eq<V: Into<OrcValue>>(&self, value: V) -> Predicate {
        Predicate::Equals(self.clone(), value.into())
    }

    pub fn ne<V: Into<OrcValue>>(&self, value: V) -> Predicate {
        !self.eq(value)
    }

    pub fn lt<V: Into<OrcValue>>(&self, value: V) -> Predicate {
        Predicate::LessThan(self.clone(), value.into())
    }

    pub fn le<V: Into<OrcValue>>(&self, value: V) -> Predicate {
        Predicate::LessThanEquals(self.clone(), value.into())
    }

    pub fn gt<V: Into<OrcValue>>(&self, value: V) -> Predicate {
        !self.le(value)
    }

    pub fn ge<V: Into<OrcValue>>(&self, value: V) -> Predicate {
        !self.lt(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Equals(PredicateColumn, OrcValue),
    LessThan(PredicateColumn, OrcValue),
    LessThanEquals(PredicateColumn, OrcValue),
}

impl Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }
}

impl BitAnd for Predicate {
    type Output = Predicate;

    fn bitand(self, rhs: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(rhs))
    }
}

impl BitOr for Predicate {
    type Output = Predicate;

    fn bitor(self, rhs: Predicate) -> Predicate {
        Predicate::Or(Box::new(self), Box::new(rhs))
    }
}

/// Lower `predicate` into a search argument over `schema`.
///
/// Literals go through the configured date, timestamp and decimal converters.
/// Columns missing from `schema` are Type errors.
pub fn compile(
    predicate: &Predicate,
    schema: &TypeDescription,
    options: &ConverterOptions,
) -> Result<SearchArgument> {
    let mut builder = SearchArgument::builder();
    build(predicate, &mut builder, options)?;
    let sarg = builder.build()?;
    sarg.resolve_columns(schema)?;
    Ok(sarg)
}

fn build(
    predicate: &Predicate,
    builder: &mut SearchArgumentBuilder,
    options: &ConverterOptions,
) -> Result<()> {
    match predicate {
        Predicate::Not(inner) => {
            builder.start_not();
            build(inner, builder, options)?;
            builder.end()?;
        }
        Predicate::And(a, b) => {
            builder.start_and();
            build(a, builder, options)?;
            build(b, builder, options)?;
            builder.end()?;
        }
        Predicate::Or(a, b) => {
            builder.start_or();
            build(a, builder, options)?;
            build(b, builder, options)?;
            builder.end()?;
        }
        Predicate::Equals(column, value) => {
            let (data_type, literal) = literal(column, value, options)?;
            builder.equals(column.column.clone(), data_type, literal)?;
        }
        Predicate::LessThan(column, value) => {
            let (data_type, literal) = literal(column, value, options)?;
            builder.less_than(column.column.clone(), data_type, literal)?;
        }
        Predicate::LessThanEquals(column, value) => {
            let (data_type, literal) = literal(column, value, options)?;
            builder.less_than_equals(column.column.clone(), data_type, literal)?;
        }
    }
    Ok(())
}

fn literal(
    column: &PredicateColumn,
    value: &OrcValue,
    options: &ConverterOptions,
) -> Result<(PredicateDataType, Literal)> {
    let data_type = match column.kind {
        TypeKind::Boolean => PredicateDataType::Boolean,
        TypeKind::Byte | TypeKind::Short | TypeKind::Int | TypeKind::Long => {
            PredicateDataType::Long
        }
        TypeKind::Float | TypeKind::Double => PredicateDataType::Float,
        TypeKind::String | TypeKind::Char | TypeKind::Varchar => PredicateDataType::String,
        TypeKind::Date => PredicateDataType::Date,
        TypeKind::Timestamp | TypeKind::TimestampInstant => PredicateDataType::Timestamp,
        TypeKind::Decimal => PredicateDataType::Decimal,
        other => {
            return Err(OrcError::type_error(format!(
                "Unsupported predicate column type: {}",
                other.name()
            )))
        }
    };
    if value.is_null() || options.is_null(value) {
        return Ok((data_type, Literal::Null));
    }

    let unsupported = || {
        OrcError::type_error(format!(
            "Unsupported literal {:?} for a {} column",
            value,
            column.kind.name()
        ))
    };
    let literal = match data_type {
        PredicateDataType::Boolean => match value {
            OrcValue::Boolean(b) => Literal::Boolean(*b),
            _ => return Err(unsupported()),
        },
        PredicateDataType::Long => match value {
            OrcValue::Integer(i) => Literal::Long(*i),
            _ => return Err(unsupported()),
        },
        PredicateDataType::Float => match value {
            OrcValue::Float(f) => Literal::Float(f.0),
            OrcValue::Integer(i) => Literal::Float(*i as f64),
            _ => return Err(unsupported()),
        },
        PredicateDataType::String => match value {
            OrcValue::String(s) => Literal::String(s.clone()),
            _ => return Err(unsupported()),
        },
        PredicateDataType::Date => Literal::Date(options.converters.date.to_orc(value)?),
        PredicateDataType::Timestamp => {
            let (seconds, nanos) = options
                .converters
                .timestamp
                .to_orc(value, &options.timezone)?;
            Literal::Timestamp(timestamp_nanos(seconds, nanos))
        }
        PredicateDataType::Decimal => Literal::Decimal(
            options
                .converters
                .decimal
                .to_orc(column.precision, column.scale, value)?
                .rescale(column.scale),
        ),
    };
    Ok((data_type, literal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sarg::{ExpressionTree, Operator};

    fn schema() -> TypeDescription {
        "struct<x:int,name:string,d:date,price:decimal(10,2),nested:struct<y:double>>"
            .parse()
            .unwrap()
    }

    #[test]
    fn test_column_construction() {
        assert!(PredicateColumn::named(TypeKind::Int, "x").is_ok());
        for kind in [
            TypeKind::Binary,
            TypeKind::List,
            TypeKind::Map,
            TypeKind::Union,
            TypeKind::Struct,
        ] {
            assert!(matches!(
                PredicateColumn::named(kind, "x"),
                Err(OrcError::Type(_))
            ));
        }
        assert!(matches!(
            PredicateColumn::named(TypeKind::Decimal, "price"),
            Err(OrcError::Value(_))
        ));
        assert!(PredicateColumn::decimal(ColumnRef::Name("price".into()), 10, 2).is_ok());
    }

    #[test]
    fn test_derived_operators_lower_to_not() {
        let x = PredicateColumn::named(TypeKind::Int, "x").unwrap();
        let sarg = compile(&x.gt(5), &schema(), &ConverterOptions::default()).unwrap();
        assert_eq!(sarg.leaves()[0].operator, Operator::LessThanEquals);
        assert_eq!(sarg.leaves()[0].literal, Literal::Long(5));
        assert!(matches!(sarg.expression(), ExpressionTree::Not(_)));

        let sarg = compile(&x.ge(5), &schema(), &ConverterOptions::default()).unwrap();
        assert_eq!(sarg.leaves()[0].operator, Operator::LessThan);

        let sarg = compile(&x.ne(5), &schema(), &ConverterOptions::default()).unwrap();
        assert_eq!(sarg.leaves()[0].operator, Operator::Equals);
        assert!(matches!(sarg.expression(), ExpressionTree::Not(_)));
    }

    #[test]
    fn test_combinators() {
        let x = PredicateColumn::named(TypeKind::Int, "x").unwrap();
        let name = PredicateColumn::named(TypeKind::String, "name").unwrap();
        let y = PredicateColumn::named(TypeKind::Double, "nested.y").unwrap();
        let predicate = (x.lt(3) | name.eq("a")) & !y.le(1.5);
        let sarg = compile(&predicate, &schema(), &ConverterOptions::default()).unwrap();
        assert_eq!(sarg.leaves().len(), 3);
        assert_eq!(sarg.resolve_columns(&schema()).unwrap(), vec![1, 2, 6]);
        let ExpressionTree::And(children) = sarg.expression() else {
            panic!("expected AND");
        };
        assert!(matches!(children[0], ExpressionTree::Or(_)));
        assert!(matches!(children[1], ExpressionTree::Not(_)));
    }

    #[test]
    fn test_typed_literals() {
        let options = ConverterOptions::default();
        let d = PredicateColumn::named(TypeKind::Date, "d").unwrap();
        let date = jiff::civil::date(1970, 1, 11);
        let sarg = compile(&d.eq(date), &schema(), &options).unwrap();
        assert_eq!(sarg.leaves()[0].literal, Literal::Date(10));
        assert_eq!(sarg.leaves()[0].data_type, PredicateDataType::Date);

        let price = PredicateColumn::decimal(ColumnRef::Name("price".into()), 10, 2).unwrap();
        let sarg = compile(&price.eq(OrcValue::from(3)), &schema(), &options).unwrap();
        assert_eq!(
            sarg.leaves()[0].literal,
            Literal::Decimal("3.00".parse().unwrap())
        );

        let x = PredicateColumn::with_id(TypeKind::Int, 1).unwrap();
        let sarg = compile(&x.eq(OrcValue::Null), &schema(), &options).unwrap();
        assert_eq!(sarg.leaves()[0].literal, Literal::Null);
    }

    #[test]
    fn test_unresolvable_predicates() {
        let options = ConverterOptions::default();
        let missing = PredicateColumn::named(TypeKind::Int, "missing").unwrap();
        assert!(matches!(
            compile(&missing.eq(1), &schema(), &options),
            Err(OrcError::Type(_))
        ));
        let x = PredicateColumn::named(TypeKind::Int, "x").unwrap();
        assert!(matches!(
            compile(&x.eq("one"), &schema(), &options),
            Err(OrcError::Type(_))
        ));
        let out_of_range = PredicateColumn::with_id(TypeKind::Int, 42).unwrap();
        assert!(matches!(
            compile(&out_of_range.eq(1), &schema(), &options),
            Err(OrcError::Type(_))
        ));
    }
}
