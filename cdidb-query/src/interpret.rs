//! Search operand interpreters
//!
//! Each whitelisted field carries an interpreter that turns the raw operand
//! string into typed bind values. Comma-joined operands expand into one
//! value per element. Interpreters are pure and never touch persistence.

use cdidb_common::constants::{EXPLICIT_FALSE, EXPLICIT_TRUE, FEMALE, MALE, OTHER_GENDER};
use cdidb_common::dates::normalize_date;
use cdidb_common::{Error, Result};

/// A typed value ready to bind into a prepared statement
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Operand interpretation strategies
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interpreter {
    /// Pass elements through as text
    Raw,
    /// Parse `MM/DD/YYYY` or `YYYY/MM/DD`, normalize to `YYYY/MM/DD`
    Date,
    /// Gender words to the gender sentinels; fails loudly on anything else
    Gender,
    /// Boolean words to the explicit true/false sentinels
    Boolean,
    /// Floats; unparseable elements are kept verbatim so the query simply
    /// does not match them
    Numeric,
}

impl Interpreter {
    /// Interpret a (possibly comma-joined) operand into bind values
    pub fn interpret(&self, operand: &str) -> Result<Vec<SqlValue>> {
        operand
            .split(',')
            .map(|element| self.interpret_one(element.trim()))
            .collect()
    }

    fn interpret_one(&self, element: &str) -> Result<SqlValue> {
        match self {
            Interpreter::Raw => Ok(SqlValue::Text(element.to_string())),
            Interpreter::Date => Ok(SqlValue::Text(normalize_date(element)?)),
            Interpreter::Gender => match element.to_lowercase().as_str() {
                "male" | "boy" | "man" => Ok(SqlValue::Int(MALE)),
                "female" | "girl" | "lady" | "woman" => Ok(SqlValue::Int(FEMALE)),
                "other" | "transgender" | "trans" | "intersex" => Ok(SqlValue::Int(OTHER_GENDER)),
                other => Err(Error::InvalidInput(format!(
                    "unrecognized gender operand: '{}'",
                    other
                ))),
            },
            Interpreter::Boolean => match element.to_lowercase().as_str() {
                "true" | "yes" | "y" | "t" | "on" | "1" => Ok(SqlValue::Int(EXPLICIT_TRUE)),
                "false" | "no" | "n" | "f" | "off" | "0" => Ok(SqlValue::Int(EXPLICIT_FALSE)),
                other => Err(Error::InvalidInput(format!(
                    "unrecognized boolean operand: '{}'",
                    other
                ))),
            },
            Interpreter::Numeric => match element.parse::<f64>() {
                Ok(number) => Ok(SqlValue::Float(number)),
                // Deliberate leniency: malformed numbers bind verbatim and
                // naturally match nothing
                Err(_) => Ok(SqlValue::Text(element.to_string())),
            },
        }
    }
}
