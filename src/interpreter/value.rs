use std::fmt;

use super::InterpreterError;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Value {
    Integer(i64),
    Boolean(bool),
    String(String),
    List(Vec<Value>),
    Null,
}

impl Value {
    pub(super) fn as_int(&self, operation: &'static str) -> Result<i64, InterpreterError> {
        match self {
            Value::Integer(value) => Ok(*value),
            Value::Null => Err(InterpreterError::NullOperand { operation }),
            Value::Boolean(_) | Value::String(_) | Value::List(_) => {
                Err(InterpreterError::TypeMismatch {
                    expected: "int",
                    got: self.type_name(),
                })
            }
        }
    }

    pub(super) fn as_bool(&self, operation: &'static str) -> Result<bool, InterpreterError> {
        match self {
            Value::Boolean(value) => Ok(*value),
            Value::Null => Err(InterpreterError::NullOperand { operation }),
            Value::Integer(_) | Value::String(_) | Value::List(_) => {
                Err(InterpreterError::TypeMismatch {
                    expected: "bool",
                    got: self.type_name(),
                })
            }
        }
    }

    pub(super) fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "int",
            Value::Boolean(_) => "bool",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Null => "null",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(value) => write!(f, "{value}"),
            Value::Boolean(value) => write!(f, "{value}"),
            Value::String(value) => f.write_str(value),
            Value::List(values) => {
                f.write_str("[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
            Value::Null => f.write_str("null"),
        }
    }
}
