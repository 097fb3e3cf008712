use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::types::CatscriptType;

use super::{VmError, VmResult};

pub(super) type ListRef = Rc<RefCell<Vec<Object>>>;

/// Heap values. Primitives only live here in boxed form.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Object {
    Null,
    Program,
    Integer(i64),
    Boolean(bool),
    String(Rc<str>),
    List(ListRef),
    Iterator {
        list: ListRef,
        position: Rc<Cell<usize>>,
    },
}

impl Object {
    pub(super) fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "null",
            Object::Program => "program",
            Object::Integer(_) => "Integer",
            Object::Boolean(_) => "Boolean",
            Object::String(_) => "String",
            Object::List(_) => "List",
            Object::Iterator { .. } => "Iterator",
        }
    }

    /// Whether a `CheckCast` to `ty` succeeds; `null` passes every cast.
    pub(super) fn is_instance_of(&self, ty: &CatscriptType) -> bool {
        match (self, ty) {
            (Object::Null, _) | (_, CatscriptType::Object) => true,
            (Object::Integer(_), CatscriptType::Int)
            | (Object::Boolean(_), CatscriptType::Boolean)
            | (Object::String(_), CatscriptType::String)
            | (Object::List(_), CatscriptType::List(_)) => true,
            _ => false,
        }
    }

    pub(super) fn as_list(&self) -> VmResult<&ListRef> {
        match self {
            Object::List(list) => Ok(list),
            Object::Null => Err(VmError::NullReference),
            other => Err(VmError::ClassCast {
                expected: "List".to_string(),
                got: other.type_name(),
            }),
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Null => f.write_str("null"),
            Object::Program => f.write_str("<program>"),
            Object::Integer(value) => write!(f, "{value}"),
            Object::Boolean(value) => write!(f, "{value}"),
            Object::String(value) => f.write_str(value),
            Object::List(list) => {
                f.write_str("[")?;
                for (index, item) in list.borrow().iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Object::Iterator { .. } => f.write_str("<iterator>"),
        }
    }
}

/// Operand stack and local slot entries.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum StackValue {
    Int(i64),
    Ref(Object),
}

impl StackValue {
    pub(super) fn into_int(self) -> VmResult<i64> {
        match self {
            StackValue::Int(value) => Ok(value),
            StackValue::Ref(object) => Err(VmError::TypeMismatch {
                expected: "int",
                got: object.type_name(),
            }),
        }
    }

    pub(super) fn into_ref(self) -> VmResult<Object> {
        match self {
            StackValue::Ref(object) => Ok(object),
            StackValue::Int(_) => Err(VmError::TypeMismatch {
                expected: "reference",
                got: "int",
            }),
        }
    }
}
