use rustc_hash::FxHashMap;

use crate::ast::{
    Ast, BinaryOperator, ComparisonOperator, EqualityOperator, Expression, NodeId, Statement,
    UnaryOperator,
};
use crate::types::CatscriptType;

use super::{InterpreterError, Value};

type EvalResult<T> = Result<T, InterpreterError>;

pub(super) const MAX_CALL_DEPTH: usize = 256;

/// Control-flow marker for statement execution.
#[derive(Debug, PartialEq)]
pub(super) enum Flow {
    Normal,
    Return(Value),
}

/// Stack of variable scopes; the bottom scope holds globals.
pub(super) struct Environment {
    scopes: Vec<FxHashMap<String, Value>>,
}

impl Environment {
    pub(super) fn new() -> Self {
        Self {
            scopes: vec![FxHashMap::default()],
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    fn load(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn declare(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    fn assign(&mut self, name: &str, value: Value) -> EvalResult<()> {
        let slot = self
            .scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
            .ok_or_else(|| InterpreterError::UndefinedVariable {
                name: name.to_string(),
            })?;
        *slot = value;
        Ok(())
    }

    /// Hides every scope but the globals and opens the callee's scope.
    /// Returns the caller's scopes for `exit_call`.
    fn enter_call(&mut self, locals: FxHashMap<String, Value>) -> Vec<FxHashMap<String, Value>> {
        let saved = self.scopes.split_off(1);
        self.scopes.push(locals);
        saved
    }

    fn exit_call(&mut self, saved: Vec<FxHashMap<String, Value>>) {
        self.scopes.truncate(1);
        self.scopes.extend(saved);
    }
}

/// Runtime executor for interpreted statements and expressions.
pub(super) struct InterpreterRuntime<'a> {
    pub(super) ast: &'a Ast,
    pub(super) functions: &'a FxHashMap<String, NodeId>,
    pub(super) environment: Environment,
    pub(super) output: &'a mut String,
    pub(super) depth: usize,
}

impl InterpreterRuntime<'_> {
    pub(super) fn execute_block(&mut self, body: &[NodeId]) -> EvalResult<Flow> {
        for &statement in body {
            if let Flow::Return(value) = self.execute(statement)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn execute_scoped(&mut self, body: &[NodeId]) -> EvalResult<Flow> {
        self.environment.push_scope();
        let flow = self.execute_block(body);
        self.environment.pop_scope();
        flow
    }

    pub(super) fn execute(&mut self, id: NodeId) -> EvalResult<Flow> {
        let ast = self.ast;
        let Some(statement) = ast.statement(id) else {
            self.evaluate(id)?;
            return Ok(Flow::Normal);
        };
        match statement {
            Statement::Variable { name, value, .. } => {
                let value = self.evaluate(*value)?;
                let value = bind(value, ast.try_ty(id))?;
                self.environment.declare(name, value);
            }
            Statement::Assignment { name, value } => {
                let value = self.evaluate(*value)?;
                let value = bind(value, ast.try_ty(id))?;
                self.environment.assign(name, value)?;
            }
            // Registered before execution starts.
            Statement::Function(_) => {}
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                if self.evaluate(*condition)?.as_bool("if condition")? {
                    return self.execute_scoped(then_body);
                } else if let Some(else_body) = else_body {
                    return self.execute_scoped(else_body);
                }
            }
            Statement::For {
                variable,
                iterable,
                body,
            } => {
                let items = match self.evaluate(*iterable)? {
                    Value::List(items) => items,
                    other => {
                        return Err(InterpreterError::NotIterable {
                            got: other.type_name(),
                        });
                    }
                };
                for item in items {
                    let item = bind(item, ast.try_ty(id))?;
                    self.environment.declare(variable, item);
                    if let Flow::Return(value) = self.execute_scoped(body)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            Statement::Print(value) => {
                let value = self.evaluate(*value)?;
                self.print(&value);
            }
            Statement::Call(call) => {
                self.evaluate(*call)?;
            }
            Statement::Return(value) => {
                let value = match value {
                    Some(value) => self.evaluate(*value)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
            Statement::SyntaxError(text) => {
                return Err(InterpreterError::SyntaxError { text: text.clone() });
            }
        }
        Ok(Flow::Normal)
    }

    pub(super) fn print(&mut self, value: &Value) {
        self.output.push_str(&value.to_string());
        self.output.push('\n');
    }

    pub(super) fn evaluate(&mut self, id: NodeId) -> EvalResult<Value> {
        let ast = self.ast;
        let Some(expression) = ast.expression(id) else {
            return Err(InterpreterError::SyntaxError {
                text: format!("{:?}", ast.kind(id)),
            });
        };
        let value = match expression {
            Expression::Identifier(name) => self.environment.load(name).cloned().ok_or_else(|| {
                InterpreterError::UndefinedVariable {
                    name: name.to_string(),
                }
            })?,
            Expression::Integer(value) => Value::Integer(*value),
            Expression::String(value) => Value::String(value.clone()),
            Expression::Boolean(value) => Value::Boolean(*value),
            Expression::Null => Value::Null,
            Expression::List(items) => Value::List(
                items
                    .iter()
                    .map(|&item| self.evaluate(item))
                    .collect::<EvalResult<Vec<_>>>()?,
            ),
            Expression::Parenthesized(inner) => self.evaluate(*inner)?,
            Expression::Unary { op, operand } => {
                let operand = self.evaluate(*operand)?;
                match op {
                    UnaryOperator::Negate => Value::Integer(operand.as_int("negation")?.wrapping_neg()),
                    UnaryOperator::Not => Value::Boolean(!operand.as_bool("negation")?),
                }
            }
            Expression::Binary { op, left, right } => {
                let concatenates = *op == BinaryOperator::Add
                    && ast.try_ty(id) == Some(&CatscriptType::String);
                let left = self.evaluate(*left)?;
                let right = self.evaluate(*right)?;
                if concatenates {
                    Value::String(format!("{left}{right}"))
                } else {
                    arithmetic(*op, &left, &right)?
                }
            }
            Expression::Comparison { op, left, right } => {
                let left = self.evaluate(*left)?.as_int("comparison")?;
                let right = self.evaluate(*right)?.as_int("comparison")?;
                Value::Boolean(match op {
                    ComparisonOperator::Less => left < right,
                    ComparisonOperator::LessEqual => left <= right,
                    ComparisonOperator::Greater => left > right,
                    ComparisonOperator::GreaterEqual => left >= right,
                })
            }
            Expression::Equality { op, left, right } => {
                let equal = self.evaluate(*left)? == self.evaluate(*right)?;
                Value::Boolean(match op {
                    EqualityOperator::Equal => equal,
                    EqualityOperator::NotEqual => !equal,
                })
            }
            Expression::Call { name, args } => self.call(name, args)?,
            Expression::SyntaxError(text) => {
                return Err(InterpreterError::SyntaxError { text: text.clone() });
            }
        };
        Ok(value)
    }

    fn call(&mut self, name: &str, args: &[NodeId]) -> EvalResult<Value> {
        let ast = self.ast;
        let function = self
            .functions
            .get(name)
            .and_then(|&id| match ast.statement(id) {
                Some(Statement::Function(function)) => Some(function),
                _ => None,
            })
            .ok_or_else(|| InterpreterError::UndefinedFunction {
                name: name.to_string(),
            })?;
        if function.params.len() != args.len() {
            return Err(InterpreterError::FunctionArityMismatch {
                name: name.to_string(),
                expected: function.params.len(),
                found: args.len(),
            });
        }

        let mut locals = FxHashMap::default();
        for (param, &arg) in function.params.iter().zip(args) {
            let value = bind(self.evaluate(arg)?, Some(&param.ty))?;
            locals.insert(param.name.clone(), value);
        }

        if self.depth >= MAX_CALL_DEPTH {
            return Err(InterpreterError::CallDepthExceeded {
                limit: MAX_CALL_DEPTH,
            });
        }
        self.depth += 1;
        let saved = self.environment.enter_call(locals);
        let flow = self.execute_block(&function.body);
        self.environment.exit_call(saved);
        self.depth -= 1;
        match flow? {
            Flow::Return(value) => bind(value, Some(&function.return_type)),
            Flow::Normal => Ok(Value::Null),
        }
    }
}

/// Checks a value entering storage of static type `ty`. `int` and `bool`
/// storage holds unboxed primitives, so `null` cannot be stored there.
fn bind(value: Value, ty: Option<&CatscriptType>) -> EvalResult<Value> {
    match (value, ty) {
        (Value::Null, Some(ty)) if ty.is_primitive() => Err(InterpreterError::NullReference),
        (value, _) => Ok(value),
    }
}

fn arithmetic(op: BinaryOperator, left: &Value, right: &Value) -> EvalResult<Value> {
    let operation = match op {
        BinaryOperator::Add => "addition",
        BinaryOperator::Sub => "subtraction",
        BinaryOperator::Mul => "multiplication",
        BinaryOperator::Div => "division",
    };
    let left = left.as_int(operation)?;
    let right = right.as_int(operation)?;
    let result = match op {
        BinaryOperator::Add => left.wrapping_add(right),
        BinaryOperator::Sub => left.wrapping_sub(right),
        BinaryOperator::Mul => left.wrapping_mul(right),
        BinaryOperator::Div => {
            if right == 0 {
                return Err(InterpreterError::DivisionByZero);
            }
            left.wrapping_div(right)
        }
    };
    Ok(Value::Integer(result))
}
