//! Search arguments: predicates evaluated against column statistics
//!
//! A [`SearchArgument`] is built with [`SearchArgumentBuilder`] from nested
//! NOT/OR/AND scopes and comparison leaves. The reader evaluates it against
//! each row group's statistics and skips groups that cannot contain a match.

use super::stats::{ColumnStatistics, StatisticsData};
use crate::decimal::Decimal;
use crate::types::TypeDescription;
use crate::{OrcError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Literal type of a predicate leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateDataType {
    Long,
    Float,
    String,
    Date,
    Decimal,
    Timestamp,
    Boolean,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// A typed null; comparisons against it are never true
    Null,
    Boolean(bool),
    Long(i64),
    Float(f64),
    String(Arc<str>),
    /// Days since the epoch
    Date(i64),
    /// Nanoseconds since the epoch
    Timestamp(i128),
    Decimal(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals = 3,
    LessThan = 4,
    LessThanEquals = 5,
}

/// Column a leaf refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Name(String),
    Id(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredicateLeaf {
    pub operator: Operator,
    pub column: ColumnRef,
    pub data_type: PredicateDataType,
    pub literal: Literal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionTree {
    Not(Box<ExpressionTree>),
    Or(Vec<ExpressionTree>),
    And(Vec<ExpressionTree>),
    Leaf(usize),
}

/// Set of possible outcomes {yes, no, null} of a predicate over a row group
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TruthValue(u8);

const T: u8 = 1;
const F: u8 = 2;
const N: u8 = 4;

impl TruthValue {
    pub const YES: TruthValue = TruthValue(T);
    pub const NO: TruthValue = TruthValue(F);
    pub const NULL: TruthValue = TruthValue(N);
    pub const YES_NULL: TruthValue = TruthValue(T | N);
    pub const NO_NULL: TruthValue = TruthValue(F | N);
    pub const YES_NO: TruthValue = TruthValue(T | F);
    pub const YES_NO_NULL: TruthValue = TruthValue(T | F | N);

    fn members(self) -> impl Iterator<Item = u8> {
        [T, F, N].into_iter().filter(move |m| self.0 & m != 0)
    }

    /// Whether rows of a group with this outcome may match
    pub fn is_needed(self) -> bool {
        self.0 & T != 0
    }

    fn with_null(self, has_null: bool) -> Self {
        if has_null {
            TruthValue(self.0 | N)
        } else {
            self
        }
    }

    pub fn not(self) -> Self {
        TruthValue(
            self.members()
                .map(|m| match m {
                    T => F,
                    F => T,
                    other => other,
                })
                .fold(0, |acc, m| acc | m),
        )
    }

    pub fn and(self, other: Self) -> Self {
        self.combine(other, |a, b| match (a, b) {
            (F, _) | (_, F) => F,
            (T, T) => T,
            _ => N,
        })
    }

    pub fn or(self, other: Self) -> Self {
        self.combine(other, |a, b| match (a, b) {
            (T, _) | (_, T) => T,
            (F, F) => F,
            _ => N,
        })
    }

    fn combine(self, other: Self, op: impl Fn(u8, u8) -> u8) -> Self {
        let mut out = 0;
        for a in self.members() {
            for b in other.members() {
                out |= op(a, b);
            }
        }
        TruthValue(out)
    }
}

impl fmt::Debug for TruthValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            T => "YES",
            F => "NO",
            N => "NULL",
            x if x == T | N => "YES_NULL",
            x if x == F | N => "NO_NULL",
            x if x == T | F => "YES_NO",
            _ => "YES_NO_NULL",
        };
        f.write_str(name)
    }
}

/// A compiled predicate
#[derive(Debug, Clone, PartialEq)]
pub struct SearchArgument {
    leaves: Vec<PredicateLeaf>,
    expression: ExpressionTree,
}

impl SearchArgument {
    pub fn builder() -> SearchArgumentBuilder {
        SearchArgumentBuilder::default()
    }

    pub fn leaves(&self) -> &[PredicateLeaf] {
        &self.leaves
    }

    pub fn expression(&self) -> &ExpressionTree {
        &self.expression
    }

    /// Column ids of every leaf. Unknown column names are Type errors.
    pub fn resolve_columns(&self, schema: &TypeDescription) -> Result<Vec<u64>> {
        self.leaves
            .iter()
            .map(|leaf| match &leaf.column {
                ColumnRef::Name(name) => schema.find_column_id(name).map_err(|_| {
                    OrcError::type_error(format!("Predicate column '{}' not found", name))
                }),
                ColumnRef::Id(id) => schema
                    .find_type(*id)
                    .map(|_| *id)
                    .map_err(|_| OrcError::type_error(format!("Predicate column {} not found", id))),
            })
            .collect()
    }

    /// Outcome over one row group. `columns` are the ids returned by
    /// [`Self::resolve_columns`] and `stats` looks up statistics by id.
    pub fn evaluate<'a>(
        &self,
        columns: &[u64],
        stats: impl Fn(u64) -> Option<&'a ColumnStatistics>,
    ) -> TruthValue {
        let leaf_values: Vec<TruthValue> = self
            .leaves
            .iter()
            .zip(columns)
            .map(|(leaf, id)| match stats(*id) {
                Some(s) => evaluate_leaf(leaf, s),
                None => TruthValue::YES_NO_NULL,
            })
            .collect();
        eval_tree(&self.expression, &leaf_values)
    }
}

fn eval_tree(tree: &ExpressionTree, leaves: &[TruthValue]) -> TruthValue {
    match tree {
        ExpressionTree::Leaf(idx) => leaves.get(*idx).copied().unwrap_or(TruthValue::YES_NO_NULL),
        ExpressionTree::Not(child) => eval_tree(child, leaves).not(),
        ExpressionTree::And(children) => children
            .iter()
            .fold(TruthValue::YES, |acc, c| acc.and(eval_tree(c, leaves))),
        ExpressionTree::Or(children) => children
            .iter()
            .fold(TruthValue::NO, |acc, c| acc.or(eval_tree(c, leaves))),
    }
}

const NANOS_PER_MILLI: i128 = 1_000_000;

/// Comparable form of a statistics bound or literal
#[derive(Debug, Clone, PartialEq, PartialOrd)]
enum Bound {
    Long(i64),
    Wide(i128),
    Float(f64),
    Text(String),
    Decimal(Decimal),
}

fn stat_bounds(data: &StatisticsData, literal: &Literal) -> Option<(Bound, Bound, Bound)> {
    use StatisticsData as S;
    let pair = match (data, literal) {
        (S::Integer { minimum, maximum, .. }, Literal::Long(v)) => {
            (Bound::Long(*minimum), Bound::Long(*maximum), Bound::Long(*v))
        }
        (S::Integer { minimum, maximum, .. }, Literal::Float(v)) => (
            Bound::Float(*minimum as f64),
            Bound::Float(*maximum as f64),
            Bound::Float(*v),
        ),
        (S::Double { minimum, maximum, .. }, Literal::Float(v)) => {
            (Bound::Float(*minimum), Bound::Float(*maximum), Bound::Float(*v))
        }
        (S::Double { minimum, maximum, .. }, Literal::Long(v)) => (
            Bound::Float(*minimum),
            Bound::Float(*maximum),
            Bound::Float(*v as f64),
        ),
        (S::String { minimum, maximum, .. }, Literal::String(v)) => (
            Bound::Text(minimum.clone()),
            Bound::Text(maximum.clone()),
            Bound::Text(v.to_string()),
        ),
        (S::Date { minimum, maximum }, Literal::Date(v)) => {
            (Bound::Long(*minimum), Bound::Long(*maximum), Bound::Long(*v))
        }
        // Millisecond bounds cover every nanosecond up to the next millisecond
        (S::Timestamp { minimum, maximum }, Literal::Timestamp(v)) => (
            Bound::Wide(*minimum as i128 * NANOS_PER_MILLI),
            Bound::Wide(*maximum as i128 * NANOS_PER_MILLI + NANOS_PER_MILLI - 1),
            Bound::Wide(*v),
        ),
        (
            S::Boolean {
                false_count,
                true_count,
            },
            Literal::Boolean(v),
        ) => (
            Bound::Long(if *false_count > 0 { 0 } else { 1 }),
            Bound::Long(if *true_count > 0 { 1 } else { 0 }),
            Bound::Long(*v as i64),
        ),
        (
            S::Decimal {
                minimum,
                maximum,
                scale,
                ..
            },
            Literal::Decimal(v),
        ) => (
            Bound::Decimal(Decimal::new(*minimum, *scale)),
            Bound::Decimal(Decimal::new(*maximum, *scale)),
            Bound::Decimal(v.clone()),
        ),
        _ => return None,
    };
    Some(pair)
}

fn evaluate_leaf(leaf: &PredicateLeaf, stats: &ColumnStatistics) -> TruthValue {
    if leaf.literal == Literal::Null {
        return TruthValue::YES_NO_NULL;
    }
    if stats.number_of_values == 0 {
        return if stats.has_null {
            TruthValue::NULL
        } else {
            TruthValue::NO
        };
    }
    let Some((min, max, lit)) = stat_bounds(&stats.data, &leaf.literal) else {
        return TruthValue::YES_NO_NULL;
    };
    let (Some(lit_vs_min), Some(lit_vs_max)) = (lit.partial_cmp(&min), lit.partial_cmp(&max))
    else {
        return TruthValue::YES_NO_NULL;
    };
    let outcome = match leaf.operator {
        Operator::Equals => {
            if lit_vs_min == Ordering::Less || lit_vs_max == Ordering::Greater {
                TruthValue::NO
            } else if min == max {
                TruthValue::YES
            } else {
                TruthValue::YES_NO
            }
        }
        // column < literal
        Operator::LessThan => {
            if lit_vs_max == Ordering::Greater {
                TruthValue::YES
            } else if lit_vs_min != Ordering::Greater {
                TruthValue::NO
            } else {
                TruthValue::YES_NO
            }
        }
        // column <= literal
        Operator::LessThanEquals => {
            if lit_vs_max != Ordering::Less {
                TruthValue::YES
            } else if lit_vs_min == Ordering::Less {
                TruthValue::NO
            } else {
                TruthValue::YES_NO
            }
        }
    };
    outcome.with_null(stats.has_null)
}

enum Scope {
    Not(Vec<ExpressionTree>),
    Or(Vec<ExpressionTree>),
    And(Vec<ExpressionTree>),
}

/// Builder with explicit NOT/OR/AND scopes, closed by [`Self::end`]
#[derive(Default)]
pub struct SearchArgumentBuilder {
    stack: Vec<Scope>,
    leaves: Vec<PredicateLeaf>,
    root: Option<ExpressionTree>,
}

impl SearchArgumentBuilder {
    pub fn start_not(&mut self) -> &mut Self {
        self.stack.push(Scope::Not(Vec::new()));
        self
    }

    pub fn start_or(&mut self) -> &mut Self {
        self.stack.push(Scope::Or(Vec::new()));
        self
    }

    pub fn start_and(&mut self) -> &mut Self {
        self.stack.push(Scope::And(Vec::new()));
        self
    }

    /// Close the innermost scope
    pub fn end(&mut self) -> Result<&mut Self> {
        let scope = self
            .stack
            .pop()
            .ok_or_else(|| OrcError::value("end() without an open scope"))?;
        let node = match scope {
            Scope::Not(mut children) => {
                if children.len() != 1 {
                    return Err(OrcError::value(format!(
                        "NOT takes exactly one operand, got {}",
                        children.len()
                    )));
                }
                ExpressionTree::Not(Box::new(children.remove(0)))
            }
            Scope::Or(children) | Scope::And(children) if children.is_empty() => {
                return Err(OrcError::value("Empty OR/AND scope"));
            }
            Scope::Or(children) => ExpressionTree::Or(children),
            Scope::And(children) => ExpressionTree::And(children),
        };
        self.push(node)?;
        Ok(self)
    }

    pub fn equals(
        &mut self,
        column: ColumnRef,
        data_type: PredicateDataType,
        literal: Literal,
    ) -> Result<&mut Self> {
        self.leaf(Operator::Equals, column, data_type, literal)
    }

    pub fn less_than(
        &mut self,
        column: ColumnRef,
        data_type: PredicateDataType,
        literal: Literal,
    ) -> Result<&mut Self> {
        self.leaf(Operator::LessThan, column, data_type, literal)
    }

    pub fn less_than_equals(
        &mut self,
        column: ColumnRef,
        data_type: PredicateDataType,
        literal: Literal,
    ) -> Result<&mut Self> {
        self.leaf(Operator::LessThanEquals, column, data_type, literal)
    }

    fn leaf(
        &mut self,
        operator: Operator,
        column: ColumnRef,
        data_type: PredicateDataType,
        literal: Literal,
    ) -> Result<&mut Self> {
        self.leaves.push(PredicateLeaf {
            operator,
            column,
            data_type,
            literal,
        });
        self.push(ExpressionTree::Leaf(self.leaves.len() - 1))?;
        Ok(self)
    }

    fn push(&mut self, node: ExpressionTree) -> Result<()> {
        match self.stack.last_mut() {
            Some(Scope::Not(children) | Scope::Or(children) | Scope::And(children)) => {
                children.push(node);
                Ok(())
            }
            None if self.root.is_none() => {
                self.root = Some(node);
                Ok(())
            }
            None => Err(OrcError::value(
                "Search argument already has a root expression",
            )),
        }
    }

    pub fn build(&mut self) -> Result<SearchArgument> {
        if !self.stack.is_empty() {
            return Err(OrcError::value(format!(
                "{} unclosed scope(s) in search argument",
                self.stack.len()
            )));
        }
        let expression = self
            .root
            .take()
            .ok_or_else(|| OrcError::value("Empty search argument"))?;
        Ok(SearchArgument {
            leaves: std::mem::take(&mut self.leaves),
            expression,
        })
    }
}
