use rustc_hash::FxHashMap;

use crate::types::CatscriptType;

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub params: Vec<CatscriptType>,
    pub return_type: CatscriptType,
}

/// Lexically scoped name → type bindings plus the program's function table.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<FxHashMap<String, CatscriptType>>,
    functions: FxHashMap<String, FunctionSignature>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![FxHashMap::default()],
            functions: FxHashMap::default(),
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub fn pop_scope(&mut self) {
        assert!(self.scopes.len() > 1, "cannot pop the global scope");
        self.scopes.pop();
    }

    /// Innermost binding for `name`.
    pub fn symbol_type(&self, name: &str) -> Option<&CatscriptType> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn has_symbol(&self, name: &str) -> bool {
        self.symbol_type(name).is_some()
    }

    pub fn declared_in_current_scope(&self, name: &str) -> bool {
        self.scopes
            .last()
            .is_some_and(|scope| scope.contains_key(name))
    }

    pub fn register_symbol(&mut self, name: &str, ty: CatscriptType) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
    }

    /// Returns `false` if a function with this name already exists.
    pub fn register_function(&mut self, name: &str, signature: FunctionSignature) -> bool {
        if self.functions.contains_key(name) {
            return false;
        }
        self.functions.insert(name.to_string(), signature);
        true
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.get(name)
    }
}
