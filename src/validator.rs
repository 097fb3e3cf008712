use log::{debug, trace};

use crate::ast::{
    Ast, BinaryOperator, Expression, FunctionDefinition, NodeId, ProgramBody, Statement,
    UnaryOperator,
};
use crate::diagnostic::ErrorKind;
use crate::symbol_table::{FunctionSignature, SymbolTable};
use crate::types::CatscriptType;

/// Type checks a parsed program in place.
///
/// Every reachable node except syntax-error expressions receives its resolved
/// type, and problems are attached to the nodes where they were found.
/// Validation never stops early.
///
/// # Panics
///
/// Panics if the tree was already validated.
pub fn validate(ast: &mut Ast) {
    let Some(root) = ast.root() else {
        return;
    };
    let mut validator = Validator {
        ast,
        symbols: SymbolTable::new(),
    };
    validator.validate_program(root);
    debug!(
        "validation finished with {} diagnostics",
        validator.ast.diagnostics().len()
    );
}

struct Validator<'a> {
    ast: &'a mut Ast,
    symbols: SymbolTable,
}

impl Validator<'_> {
    fn validate_program(&mut self, root: NodeId) {
        let Some(body) = self.ast.program_body().cloned() else {
            return;
        };
        match body {
            ProgramBody::Expression(expression) => {
                self.validate_expression(expression);
            }
            ProgramBody::Statements(statements) => {
                self.register_functions(&statements);
                for statement in statements {
                    self.validate_statement(statement);
                }
            }
        }
        self.ast.set_ty(root, CatscriptType::Void);
    }

    /// Functions are callable before their definition, so signatures are
    /// collected ahead of the statement pass.
    fn register_functions(&mut self, statements: &[NodeId]) {
        for &id in statements {
            let Some(Statement::Function(function)) = self.ast.statement(id) else {
                continue;
            };
            let signature = FunctionSignature {
                params: function.params.iter().map(|param| param.ty.clone()).collect(),
                return_type: function.return_type.clone(),
            };
            let name = function.name.clone();
            if !self.symbols.register_function(&name, signature) {
                self.ast.add_error(id, ErrorKind::DuplicateName);
            }
        }
    }

    fn validate_statement(&mut self, id: NodeId) {
        let Some(statement) = self.ast.statement(id).cloned() else {
            return;
        };
        let ty = match statement {
            Statement::Variable {
                name,
                explicit_type,
                value,
            } => self.validate_variable(id, &name, explicit_type, value),
            Statement::Assignment { name, value } => {
                let value_type = self.validate_expression(value);
                match self.symbols.symbol_type(&name).cloned() {
                    Some(target) => {
                        if let Some(value_type) = value_type
                            && !target.is_assignable_from(&value_type)
                        {
                            self.ast.add_error(value, ErrorKind::IncompatibleTypes);
                        }
                        target
                    }
                    None => {
                        self.ast.add_error(id, ErrorKind::UnknownName);
                        CatscriptType::Object
                    }
                }
            }
            Statement::Function(function) => self.validate_function(id, &function),
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                let condition_type = self.validate_expression(condition);
                self.check_type(condition, condition_type.as_ref(), &CatscriptType::Boolean);
                self.validate_block(&then_body);
                if let Some(else_body) = else_body {
                    self.validate_block(&else_body);
                }
                CatscriptType::Void
            }
            Statement::For {
                variable,
                iterable,
                body,
            } => {
                let iterable_type = self.validate_expression(iterable);
                self.symbols.push_scope();
                if self.symbols.has_symbol(&variable) {
                    self.ast.add_error(id, ErrorKind::DuplicateName);
                }
                let variable_type = match iterable_type.as_ref().and_then(|ty| ty.component_type())
                {
                    Some(component) => component.clone(),
                    None => {
                        if iterable_type.is_some() {
                            let at = self.ast.span(id).start_point();
                            self.ast.add_error_at(id, ErrorKind::IncompatibleTypes, at);
                        }
                        CatscriptType::Object
                    }
                };
                self.symbols.register_symbol(&variable, variable_type.clone());
                for statement in body {
                    self.validate_statement(statement);
                }
                self.symbols.pop_scope();
                variable_type
            }
            Statement::Print(value) => {
                let value_type = self.validate_expression(value);
                self.check_value(value, value_type.as_ref());
                CatscriptType::Void
            }
            Statement::Call(call) => {
                self.validate_expression(call);
                CatscriptType::Void
            }
            Statement::Return(value) => {
                self.validate_return(id, value);
                CatscriptType::Void
            }
            Statement::SyntaxError(_) => CatscriptType::Void,
        };
        self.ast.set_ty(id, ty);
    }

    fn validate_block(&mut self, statements: &[NodeId]) {
        self.symbols.push_scope();
        for &statement in statements {
            self.validate_statement(statement);
        }
        self.symbols.pop_scope();
    }

    fn validate_variable(
        &mut self,
        id: NodeId,
        name: &str,
        explicit_type: Option<CatscriptType>,
        value: NodeId,
    ) -> CatscriptType {
        let value_type = self.validate_expression(value);
        self.check_value(value, value_type.as_ref());

        let ty = match (explicit_type, value_type) {
            (Some(explicit), Some(value_type)) => {
                if !explicit.is_assignable_from(&value_type) {
                    self.ast.add_error(id, ErrorKind::IncompatibleTypes);
                }
                explicit
            }
            (Some(explicit), None) => explicit,
            (None, Some(CatscriptType::Null | CatscriptType::Void) | None) => {
                CatscriptType::Object
            }
            (None, Some(inferred)) => inferred,
        };

        if self.symbols.declared_in_current_scope(name) {
            self.ast.add_error(id, ErrorKind::DuplicateName);
        } else {
            self.symbols.register_symbol(name, ty.clone());
        }
        ty
    }

    fn validate_function(&mut self, id: NodeId, function: &FunctionDefinition) -> CatscriptType {
        trace!("validating function {}", function.name);
        if !self.ast.is_top_level(id) {
            self.ast.add_error(id, ErrorKind::NestedFunction);
        }

        self.symbols.push_scope();
        for param in &function.params {
            if self.symbols.declared_in_current_scope(&param.name) {
                self.ast.add_error(id, ErrorKind::DuplicateName);
            } else {
                self.symbols.register_symbol(&param.name, param.ty.clone());
            }
        }
        for &statement in &function.body {
            self.validate_statement(statement);
        }
        self.symbols.pop_scope();

        if function.return_type != CatscriptType::Void && !self.always_returns(&function.body) {
            self.ast.add_error(id, ErrorKind::MissingReturnStatement);
        }
        function.return_type.clone()
    }

    /// Whether every path through `statements` ends in a `return`.
    fn always_returns(&self, statements: &[NodeId]) -> bool {
        statements
            .iter()
            .any(|&id| match self.ast.statement(id) {
                Some(Statement::Return(_)) => true,
                Some(Statement::If {
                    then_body,
                    else_body: Some(else_body),
                    ..
                }) => self.always_returns(then_body) && self.always_returns(else_body),
                _ => false,
            })
    }

    fn validate_return(&mut self, id: NodeId, value: Option<NodeId>) {
        let value_type = value.and_then(|value| self.validate_expression(value));
        let return_type = match self.ast.enclosing_function(id).map(|f| self.ast.statement(f)) {
            Some(Some(Statement::Function(function))) => function.return_type.clone(),
            _ => return,
        };
        match (value, value_type) {
            (Some(_), _) if return_type == CatscriptType::Void => {
                self.ast.add_error(id, ErrorKind::IncompatibleTypes);
            }
            (Some(value), Some(value_type)) if !return_type.is_assignable_from(&value_type) => {
                self.ast.add_error(value, ErrorKind::IncompatibleTypes);
            }
            (None, _) if return_type != CatscriptType::Void => {
                self.ast.add_error(id, ErrorKind::IncompatibleTypes);
            }
            _ => {}
        }
    }

    /// Types an expression tree bottom-up. Returns `None` only for syntax
    /// errors, which stay untyped.
    fn validate_expression(&mut self, id: NodeId) -> Option<CatscriptType> {
        let expression = self.ast.expression(id)?.clone();
        let ty = match expression {
            Expression::SyntaxError(_) => return None,
            Expression::Identifier(name) => match self.symbols.symbol_type(&name) {
                Some(ty) => ty.clone(),
                None => {
                    self.ast.add_error(id, ErrorKind::UnknownName);
                    CatscriptType::Object
                }
            },
            Expression::Integer(_) => CatscriptType::Int,
            Expression::String(_) => CatscriptType::String,
            Expression::Boolean(_) => CatscriptType::Boolean,
            Expression::Null => CatscriptType::Null,
            Expression::List(items) => {
                let mut component: Option<CatscriptType> = None;
                for item in items {
                    let Some(item_type) = self.validate_expression(item) else {
                        continue;
                    };
                    self.check_value(item, Some(&item_type));
                    component = Some(match component {
                        Some(joined) => joined.join(&item_type),
                        None => item_type,
                    });
                }
                CatscriptType::list_of(component.unwrap_or(CatscriptType::Object))
            }
            Expression::Parenthesized(inner) => self
                .validate_expression(inner)
                .unwrap_or(CatscriptType::Object),
            Expression::Unary { op, operand } => {
                let operand_type = self.validate_expression(operand);
                let expected = match op {
                    UnaryOperator::Negate => CatscriptType::Int,
                    UnaryOperator::Not => CatscriptType::Boolean,
                };
                self.check_type(operand, operand_type.as_ref(), &expected);
                expected
            }
            Expression::Binary { op, left, right } => {
                let left_type = self.validate_expression(left);
                let right_type = self.validate_expression(right);
                let concatenates = op == BinaryOperator::Add
                    && (left_type == Some(CatscriptType::String)
                        || right_type == Some(CatscriptType::String));
                if concatenates {
                    self.check_value(left, left_type.as_ref());
                    self.check_value(right, right_type.as_ref());
                    CatscriptType::String
                } else {
                    self.check_type(left, left_type.as_ref(), &CatscriptType::Int);
                    self.check_type(right, right_type.as_ref(), &CatscriptType::Int);
                    CatscriptType::Int
                }
            }
            Expression::Comparison { left, right, .. } => {
                let left_type = self.validate_expression(left);
                let right_type = self.validate_expression(right);
                self.check_type(left, left_type.as_ref(), &CatscriptType::Int);
                self.check_type(right, right_type.as_ref(), &CatscriptType::Int);
                CatscriptType::Boolean
            }
            Expression::Equality { left, right, .. } => {
                let left_type = self.validate_expression(left);
                let right_type = self.validate_expression(right);
                self.check_value(left, left_type.as_ref());
                self.check_value(right, right_type.as_ref());
                CatscriptType::Boolean
            }
            Expression::Call { name, args } => self.validate_call(id, &name, &args),
        };
        self.ast.set_ty(id, ty.clone());
        Some(ty)
    }

    fn validate_call(&mut self, id: NodeId, name: &str, args: &[NodeId]) -> CatscriptType {
        let arg_types: Vec<_> = args
            .iter()
            .map(|&arg| self.validate_expression(arg))
            .collect();
        let Some(signature) = self.symbols.function(name).cloned() else {
            self.ast.add_error(id, ErrorKind::UnknownName);
            return CatscriptType::Object;
        };
        if signature.params.len() != args.len() {
            self.ast.add_error(id, ErrorKind::ArgMismatch);
        }
        for ((&arg, arg_type), param) in args.iter().zip(&arg_types).zip(&signature.params) {
            if let Some(arg_type) = arg_type
                && !param.is_assignable_from(arg_type)
            {
                self.ast.add_error(arg, ErrorKind::IncompatibleTypes);
            }
        }
        signature.return_type
    }

    fn check_type(&mut self, id: NodeId, actual: Option<&CatscriptType>, expected: &CatscriptType) {
        if let Some(actual) = actual
            && actual != expected
        {
            self.ast.add_error(id, ErrorKind::IncompatibleTypes);
        }
    }

    /// A `void` call result cannot be used as a value.
    fn check_value(&mut self, id: NodeId, actual: Option<&CatscriptType>) {
        if actual == Some(&CatscriptType::Void) {
            self.ast.add_error(id, ErrorKind::IncompatibleTypes);
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::parser::parse;

    fn validated(source: &str) -> Ast {
        let mut ast = parse(source);
        validate(&mut ast);
        ast
    }

    fn kinds(ast: &Ast) -> Vec<ErrorKind> {
        ast.diagnostics().iter().map(|d| d.kind).collect()
    }

    fn root_type(ast: &Ast) -> &CatscriptType {
        let Some(ProgramBody::Expression(id)) = ast.program_body() else {
            panic!("expected expression program");
        };
        ast.ty(*id)
    }

    #[test]
    fn list_literal_types_are_joined() {
        assert_eq!(
            root_type(&validated(r#"[1, "a", true]"#)),
            &CatscriptType::list_of(CatscriptType::Object)
        );
        assert_eq!(
            root_type(&validated("[1, 2, 3]")),
            &CatscriptType::list_of(CatscriptType::Int)
        );
        assert_eq!(
            root_type(&validated("[]")),
            &CatscriptType::list_of(CatscriptType::Object)
        );
        assert_eq!(
            root_type(&validated("[null, 1]")),
            &CatscriptType::list_of(CatscriptType::Int)
        );
    }

    #[test]
    fn comparison_flags_each_bad_operand() {
        let ast = validated(r#""a" > 1"#);
        assert_eq!(root_type(&ast), &CatscriptType::Boolean);
        let diagnostics = ast.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, ErrorKind::IncompatibleTypes);
        assert_eq!(diagnostics[0].span.start, 0);

        let ast = validated(r#""a" > true"#);
        assert_eq!(kinds(&ast), vec![ErrorKind::IncompatibleTypes; 2]);
    }

    #[test]
    fn additive_with_string_concatenates() {
        assert_eq!(root_type(&validated(r#"1 + "1""#)), &CatscriptType::String);
        assert_eq!(root_type(&validated("1 + 1")), &CatscriptType::Int);
        let ast = validated("true - 1");
        assert_eq!(kinds(&ast), vec![ErrorKind::IncompatibleTypes]);
    }

    #[test]
    fn duplicate_name_in_same_scope_only() {
        let ast = validated("var x = 1\nvar x = 2");
        assert_eq!(kinds(&ast), vec![ErrorKind::DuplicateName]);

        let ast = validated(indoc! {"
            var x = 1
            if (true) { var x = 2 print(x) }
            print(x)
        "});
        assert!(kinds(&ast).is_empty());
    }

    #[test]
    fn loop_variable_may_not_shadow() {
        let ast = validated("var x = 1\nfor (x in [1, 2]) { print(x) }");
        assert_eq!(kinds(&ast), vec![ErrorKind::DuplicateName]);
    }

    #[test]
    fn iterating_a_non_list_is_reported_at_the_loop_start() {
        let ast = validated("for (x in 10) { print(x) }");
        let diagnostics = ast.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, ErrorKind::IncompatibleTypes);
        assert_eq!(diagnostics[0].span.start, diagnostics[0].span.end);
    }

    #[test]
    fn unknown_names_are_reported() {
        let ast = validated("print(y)\nz = 1\nmissing(1)");
        assert_eq!(kinds(&ast), vec![ErrorKind::UnknownName; 3]);
    }

    #[test]
    fn explicit_types_constrain_initializers() {
        let ast = validated(indoc! {r#"
            var a : int = "no"
            var b : list<object> = [1, 2]
            var c : list<int> = [1, "2"]
            var d : string = null
        "#});
        assert_eq!(kinds(&ast), vec![ErrorKind::IncompatibleTypes; 2]);
    }

    #[test]
    fn null_initializer_infers_object() {
        let ast = validated("var a = null\na = 1");
        let Some(ProgramBody::Statements(ids)) = ast.program_body() else {
            panic!("expected statements");
        };
        assert_eq!(ast.ty(ids[0]), &CatscriptType::Object);
        assert!(kinds(&ast).is_empty());
    }

    #[test]
    fn calls_check_arity_and_argument_types() {
        let ast = validated(indoc! {r#"
            print(twice(2))
            twice("x")
            twice(1, 2)
            function twice(n : int) : int { return n * 2 }
        "#});
        assert_eq!(
            kinds(&ast),
            vec![ErrorKind::IncompatibleTypes, ErrorKind::ArgMismatch]
        );
    }

    #[test]
    fn return_statements_match_function_type() {
        let ast = validated(indoc! {r#"
            function a() : int { return "s" }
            function b() { return 1 }
            function c() : int { return }
            function d(x : bool) : int {
              if (x) { return 1 } else { return 2 }
            }
        "#});
        assert_eq!(kinds(&ast), vec![ErrorKind::IncompatibleTypes; 3]);
    }

    #[test]
    fn missing_return_is_reported() {
        let ast = validated(indoc! {"
            function f(x : bool) : int {
              if (x) { return 1 }
            }
        "});
        assert_eq!(kinds(&ast), vec![ErrorKind::MissingReturnStatement]);
    }

    #[test]
    fn duplicate_and_nested_functions_are_reported() {
        let ast = validated(indoc! {"
            function f() {}
            function f() {}
            function g() { function h() {} }
        "});
        assert_eq!(
            kinds(&ast),
            vec![ErrorKind::DuplicateName, ErrorKind::NestedFunction]
        );
    }

    #[test]
    fn void_results_are_not_values() {
        let ast = validated("function f() {}\nprint(f())\nvar x = f()\nf()");
        assert_eq!(kinds(&ast), vec![ErrorKind::IncompatibleTypes; 2]);
        let lines: Vec<usize> = ast.diagnostics().iter().map(|d| d.span.line).collect();
        assert_eq!(lines, vec![2, 3]);
    }

    #[test]
    fn syntax_error_expressions_stay_untyped() {
        let mut ast = crate::parser::parse_as_expression("-)");
        validate(&mut ast);
        let Some(ProgramBody::Expression(id)) = ast.program_body() else {
            panic!("expected expression program");
        };
        let Some(Expression::Unary { operand, .. }) = ast.expression(*id) else {
            panic!("expected unary");
        };
        assert_eq!(ast.try_ty(*operand), None);
        assert_eq!(ast.ty(*id), &CatscriptType::Int);
        assert_eq!(kinds(&ast), vec![ErrorKind::UnexpectedToken]);
    }
}
