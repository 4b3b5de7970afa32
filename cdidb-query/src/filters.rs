//! Filter compiler
//!
//! Turns (field, operator, operand) triples into a parameterized statement
//! against a named table. Fields and operators come from closed whitelists;
//! anything else is silently dropped. The drop is a security boundary
//! against injected column names from the web layer, and every drop leaves
//! a debug-level audit line so misuse stays diagnosable.
//!
//! Operand values never appear in the statement text, only `?`
//! placeholders; comma-joined operands expand into an OR disjunction.

use crate::interpret::Interpreter;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::debug;

/// One query predicate as received from a caller
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub operator: String,
    pub operand: String,
}

impl Filter {
    pub fn new(
        field: impl Into<String>,
        operator: impl Into<String>,
        operand: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            operand: operand.into(),
        }
    }
}

/// A whitelisted field: symbolic name, stored column, operand interpreter
#[derive(Debug)]
pub struct FieldSpec {
    pub field: &'static str,
    pub column: &'static str,
    pub interpreter: Interpreter,
}

/// Statement shapes the compiler can emit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatementKind {
    /// `SELECT * FROM <table> WHERE <clause>`
    Select,
    /// `UPDATE <table> SET deleted = ? WHERE <clause>`; the deleted value
    /// binds before the filter operands
    SetDeleted,
    /// `DELETE FROM <table> WHERE <clause>`
    HardDelete,
}

/// A compiled statement plus the surviving filters, in order, for operand
/// interpretation at bind time
#[derive(Debug)]
pub struct CompiledQuery {
    pub sql: String,
    pub filters: Vec<(&'static FieldSpec, String)>,
}

static FIELD_WHITELIST: Lazy<HashMap<&'static str, FieldSpec>> = Lazy::new(|| {
    let specs = [
        FieldSpec { field: "database_id", column: "database_id", interpreter: Interpreter::Numeric },
        FieldSpec { field: "child_id", column: "child_id", interpreter: Interpreter::Raw },
        FieldSpec { field: "study_id", column: "study_id", interpreter: Interpreter::Raw },
        FieldSpec { field: "study", column: "study", interpreter: Interpreter::Raw },
        FieldSpec { field: "gender", column: "gender", interpreter: Interpreter::Gender },
        FieldSpec { field: "age", column: "age", interpreter: Interpreter::Numeric },
        FieldSpec { field: "birthday", column: "birthday", interpreter: Interpreter::Date },
        FieldSpec { field: "session_date", column: "session_date", interpreter: Interpreter::Date },
        FieldSpec { field: "session_num", column: "session_num", interpreter: Interpreter::Numeric },
        FieldSpec {
            field: "total_num_sessions",
            column: "total_num_sessions",
            interpreter: Interpreter::Numeric,
        },
        FieldSpec { field: "words_spoken", column: "words_spoken", interpreter: Interpreter::Numeric },
        FieldSpec {
            field: "items_excluded",
            column: "items_excluded",
            interpreter: Interpreter::Numeric,
        },
        FieldSpec { field: "percentile", column: "percentile", interpreter: Interpreter::Numeric },
        FieldSpec {
            field: "extra_categories",
            column: "extra_categories",
            interpreter: Interpreter::Numeric,
        },
        FieldSpec { field: "revision", column: "revision", interpreter: Interpreter::Numeric },
        FieldSpec { field: "languages", column: "languages", interpreter: Interpreter::Raw },
        FieldSpec {
            field: "num_languages",
            column: "num_languages",
            interpreter: Interpreter::Numeric,
        },
        FieldSpec { field: "cdi_type", column: "cdi_type", interpreter: Interpreter::Raw },
        FieldSpec {
            field: "hard_of_hearing",
            column: "hard_of_hearing",
            interpreter: Interpreter::Boolean,
        },
        FieldSpec { field: "deleted", column: "deleted", interpreter: Interpreter::Boolean },
    ];
    specs.into_iter().map(|spec| (spec.field, spec)).collect()
});

static OPERATOR_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("eq", "=="),
        ("neq", "!="),
        ("lt", "<"),
        ("lteq", "<="),
        ("gt", ">"),
        ("gteq", ">="),
    ])
});

/// Compile a filter list into a parameterized statement.
///
/// `table` must be one of the internal table-name constants; it is spliced
/// into the template, while operands only ever bind through placeholders.
pub fn compile(filters: &[Filter], table: &str, kind: StatementKind) -> CompiledQuery {
    let mut clauses = Vec::new();
    let mut surviving: Vec<(&'static FieldSpec, String)> = Vec::new();

    for filter in filters {
        let Some(spec) = FIELD_WHITELIST.get(filter.field.as_str()) else {
            debug!("dropping filter on unknown field '{}'", filter.field);
            continue;
        };
        let Some(op) = OPERATOR_MAP.get(filter.operator.as_str()) else {
            debug!(
                "dropping filter on '{}' with unknown operator '{}'",
                filter.field, filter.operator
            );
            continue;
        };

        let comparisons: Vec<String> = filter
            .operand
            .split(',')
            .map(|_| format!("{} {} ?", spec.column, op))
            .collect();
        clauses.push(format!("({})", comparisons.join(" OR ")));
        surviving.push((spec, filter.operand.clone()));
    }

    let where_clause = if clauses.is_empty() {
        // Internal callers may compile without filters; the query executor
        // always appends at least a deleted clause for searches
        "1 == 1".to_string()
    } else {
        clauses.join(" AND ")
    };

    let sql = match kind {
        StatementKind::Select => format!("SELECT * FROM {} WHERE {}", table, where_clause),
        StatementKind::SetDeleted => {
            format!("UPDATE {} SET deleted = ? WHERE {}", table, where_clause)
        }
        StatementKind::HardDelete => format!("DELETE FROM {} WHERE {}", table, where_clause),
    };

    CompiledQuery {
        sql,
        filters: surviving,
    }
}
