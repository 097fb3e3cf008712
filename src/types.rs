use std::fmt;

/// Static types of the language: a closed set of simple types plus `list<T>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CatscriptType {
    Int,
    String,
    Boolean,
    Object,
    Void,
    Null,
    List(Box<CatscriptType>),
}

impl CatscriptType {
    pub fn list_of(component: CatscriptType) -> Self {
        CatscriptType::List(Box::new(component))
    }

    /// Spellings usable in type annotations, except `list` which takes an
    /// optional `<T>` and is handled by the parser.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(CatscriptType::Int),
            "string" => Some(CatscriptType::String),
            "bool" => Some(CatscriptType::Boolean),
            "object" => Some(CatscriptType::Object),
            _ => None,
        }
    }

    pub fn component_type(&self) -> Option<&CatscriptType> {
        match self {
            CatscriptType::List(component) => Some(component),
            _ => None,
        }
    }

    /// Whether a value of type `other` may be stored where `self` is expected.
    pub fn is_assignable_from(&self, other: &CatscriptType) -> bool {
        match (self, other) {
            (CatscriptType::Void, _) => *other == CatscriptType::Void,
            (_, CatscriptType::Void) => false,
            (_, CatscriptType::Null) => true,
            (CatscriptType::Object, _) => true,
            (CatscriptType::List(target), CatscriptType::List(source)) => {
                target.is_assignable_from(source)
            }
            _ => self == other,
        }
    }

    /// Least type covering both, falling back to `object`.
    pub fn join(&self, other: &CatscriptType) -> CatscriptType {
        if self.is_assignable_from(other) {
            self.clone()
        } else if other.is_assignable_from(self) {
            other.clone()
        } else {
            CatscriptType::Object
        }
    }

    /// Types kept unboxed on the VM operand stack, in slots and in fields.
    pub fn is_primitive(&self) -> bool {
        matches!(self, CatscriptType::Int | CatscriptType::Boolean)
    }
}

impl fmt::Display for CatscriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatscriptType::Int => write!(f, "int"),
            CatscriptType::String => write!(f, "string"),
            CatscriptType::Boolean => write!(f, "bool"),
            CatscriptType::Object => write!(f, "object"),
            CatscriptType::Void => write!(f, "void"),
            CatscriptType::Null => write!(f, "null"),
            CatscriptType::List(component) => write!(f, "list<{component}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CatscriptType::{self, *};

    #[test]
    fn null_is_assignable_to_everything_but_void() {
        for target in [Int, String, Boolean, Object, CatscriptType::list_of(Int)] {
            assert!(target.is_assignable_from(&Null), "{target} from null");
        }
        assert!(!Void.is_assignable_from(&Null));
    }

    #[test]
    fn object_is_the_universal_supertype() {
        for source in [Int, String, Boolean, Null, CatscriptType::list_of(String)] {
            assert!(Object.is_assignable_from(&source), "object from {source}");
        }
        assert!(!Object.is_assignable_from(&Void));
        assert!(!Int.is_assignable_from(&Object));
    }

    #[test]
    fn lists_are_covariant_in_their_component() {
        let objects = CatscriptType::list_of(Object);
        let ints = CatscriptType::list_of(Int);
        assert!(objects.is_assignable_from(&ints));
        assert!(!ints.is_assignable_from(&objects));
        assert!(ints.is_assignable_from(&CatscriptType::list_of(Null)));
        assert!(!ints.is_assignable_from(&Int));
    }

    #[test]
    fn join_falls_back_to_object() {
        assert_eq!(Int.join(&Int), Int);
        assert_eq!(Null.join(&String), String);
        assert_eq!(Int.join(&String), Object);
        assert_eq!(
            CatscriptType::list_of(Int).join(&CatscriptType::list_of(Object)),
            CatscriptType::list_of(Object)
        );
    }

    #[test]
    fn displays_surface_spellings() {
        let nested = CatscriptType::list_of(CatscriptType::list_of(Boolean));
        assert_eq!(nested.to_string(), "list<list<bool>>");
        assert_eq!(CatscriptType::from_name("bool"), Some(Boolean));
        assert_eq!(CatscriptType::from_name("list"), None);
    }
}
