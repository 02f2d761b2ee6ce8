//! Componentwise boolean operators. Zero is false, anything else true;
//! results are 0.0 or 1.0. These fields have no derivatives: asking for
//! them is an error rather than a silently cleared flag.

use serde::{Deserialize, Serialize};

use super::{ComputeContext, Established, FieldKind};
use crate::field::{FieldCache, FieldError, FieldGraph, FieldId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    Or,
    And,
    Xor,
    EqualTo,
    LessThan,
    GreaterThan,
}

impl LogicalOperator {
    pub const ALL: [Self; 6] = [
        Self::Or,
        Self::And,
        Self::Xor,
        Self::EqualTo,
        Self::LessThan,
        Self::GreaterThan,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Xor => "xor",
            Self::EqualTo => "equal_to",
            Self::LessThan => "less_than",
            Self::GreaterThan => "greater_than",
        }
    }

    #[must_use]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        let (p, q) = (a != 0.0, b != 0.0);
        let result = match self {
            Self::Or => p || q,
            Self::And => p && q,
            Self::Xor => p != q,
            Self::EqualTo => a == b,
            Self::LessThan => a < b,
            Self::GreaterThan => a > b,
        };
        if result { 1.0 } else { 0.0 }
    }
}

pub(crate) fn establish(
    graph: &FieldGraph,
    operator: LogicalOperator,
    first: FieldId,
    second: FieldId,
) -> Result<Established, FieldError> {
    let a = graph.field(first)?;
    let b = graph.field(second)?;
    if a.number_of_components() != b.number_of_components() {
        return Err(FieldError::argument(format!(
            "{} needs sources with equal component counts: `{}` has {}, `{}` has {}",
            operator.as_str(),
            a.name(),
            a.number_of_components(),
            b.name(),
            b.number_of_components()
        )));
    }
    Ok(Established::new(
        FieldKind::Logical(operator),
        vec![first, second],
        a.number_of_components(),
    ))
}

pub(crate) fn compute(
    ctx: &ComputeContext<'_>,
    operator: LogicalOperator,
    cache: &mut FieldCache,
) -> Result<(), FieldError> {
    if ctx.need_derivatives {
        return Err(FieldError::unsupported(ctx.field.name(), "derivatives"));
    }
    let a = ctx.source(0)?.cache.values();
    let b = ctx.source(1)?.cache.values();
    for ((value, a), b) in cache.values.iter_mut().zip(a).zip(b) {
        *value = operator.apply(*a, *b);
    }
    cache.derivatives_valid = false;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truth_tables() {
        let pairs = [(0.0, 0.0), (0.0, 2.0), (-1.0, 0.0), (3.0, 3.0)];
        let table = |op: LogicalOperator| -> Vec<f64> {
            pairs.iter().map(|(a, b)| op.apply(*a, *b)).collect()
        };
        assert_eq!(table(LogicalOperator::Or), vec![0.0, 1.0, 1.0, 1.0]);
        assert_eq!(table(LogicalOperator::And), vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(table(LogicalOperator::Xor), vec![0.0, 1.0, 1.0, 0.0]);
        assert_eq!(table(LogicalOperator::EqualTo), vec![1.0, 0.0, 0.0, 1.0]);
        assert_eq!(table(LogicalOperator::LessThan), vec![0.0, 1.0, 1.0, 0.0]);
        assert_eq!(table(LogicalOperator::GreaterThan), vec![0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn names_are_distinct() {
        let mut names: Vec<_> = LogicalOperator::ALL.iter().map(|op| op.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), LogicalOperator::ALL.len());
    }
}
