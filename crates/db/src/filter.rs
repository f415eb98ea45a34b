//! Row predicates for [`crate::Table::select`].

use core::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

use crate::{DbError, Result, Row, Value, column::ColumnType};

/// Comparison applied by a [`Filter`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[derive(strum::IntoStaticStr)]
#[derive(strum::EnumString)]
#[derive(strum::VariantArray)]
#[derive(Serialize, Deserialize)]
pub enum Operator {
    /// Equal
    #[strum(serialize = "=")]
    #[serde(rename = "=")]
    Eq,
    /// Not equal
    #[strum(to_string = "!=", serialize = "<>")]
    #[serde(rename = "!=")]
    Ne,
    /// Less than
    #[strum(serialize = "<")]
    #[serde(rename = "<")]
    Lt,
    /// Less than or equal
    #[strum(serialize = "<=")]
    #[serde(rename = "<=")]
    Le,
    /// Greater than
    #[strum(serialize = ">")]
    #[serde(rename = ">")]
    Gt,
    /// Greater than or equal
    #[strum(serialize = ">=")]
    #[serde(rename = ">=")]
    Ge,
}

impl Operator {
    /// The operator's symbol
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    const fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering.is_eq(),
            Self::Ne => ordering.is_ne(),
            Self::Lt => ordering.is_lt(),
            Self::Le => ordering.is_le(),
            Self::Gt => ordering.is_gt(),
            Self::Ge => ordering.is_ge(),
        }
    }
}

impl fmt::Display for Operator {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `column <op> value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Column the filter reads
    pub column: String,
    /// Comparison
    pub op: Operator,
    /// Right-hand side
    pub value: Value,
}

impl Filter {
    /// Creates a filter
    pub fn new(column: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// Checks the right-hand side against the filtered column's type
    pub(crate) fn check(&self, column_type: ColumnType) -> Result<()> {
        let numeric = |t: ColumnType| matches!(t, ColumnType::Integer | ColumnType::Float);
        let ok = self.value.matches(column_type)
            || (numeric(column_type) && matches!(self.value, Value::Int(_) | Value::Float(_)));
        if ok {
            Ok(())
        } else {
            Err(DbError::type_mismatch(&self.column, column_type, self.value.kind()))
        }
    }

    /// Whether `row` satisfies the filter; rows without the column never do
    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.column)
            .and_then(|value| value.compare(&self.value))
            .is_some_and(|ordering| self.op.accepts(ordering))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.op, self.value)
    }
}
