use std::fmt;

use log::debug;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::ast::{
    Ast, BinaryOperator, ComparisonOperator, EqualityOperator, Expression, FunctionDefinition,
    NodeId, ProgramBody, Statement, UnaryOperator,
};
use crate::types::CatscriptType;

mod generator;

use generator::CodeGenerator;

pub type Slot = usize;

/// Jump target, unique within one code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub usize);

/// Storage representation of a field: unboxed `int`/`bool` or a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    Int,
    Reference,
}

impl Descriptor {
    pub fn of(ty: &CatscriptType) -> Self {
        if ty.is_primitive() {
            Descriptor::Int
        } else {
            Descriptor::Reference
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Int,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

/// Host library routines the generated code relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `(list, object) -> int`, always 1.
    ListAdd,
    ListIterator,
    IteratorHasNext,
    IteratorNext,
    StringValueOf,
    StringConcat,
    ObjectsEquals,
    /// `(program, object) -> ()`.
    Print,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    IConst(i64),
    Ldc(String),
    AConstNull,
    ILoad(Slot),
    IStore(Slot),
    ALoad(Slot),
    AStore(Slot),
    GetField {
        name: String,
        descriptor: Descriptor,
    },
    PutField {
        name: String,
        descriptor: Descriptor,
    },
    IAdd,
    ISub,
    IMul,
    IDiv,
    INeg,
    IXor,
    IfICmp(Condition, Label),
    IfEq(Label),
    Goto(Label),
    Label(Label),
    Dup,
    Pop,
    NewList,
    Invoke(Method),
    /// Calls a program function; the stack holds the program object followed
    /// by `argc` arguments.
    InvokeFunction {
        name: String,
        argc: usize,
        returns: bool,
    },
    CheckCast(CatscriptType),
    Box(Primitive),
    Unbox(Primitive),
    IReturn,
    AReturn,
    Return,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub descriptor: Descriptor,
}

#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub params: Vec<CatscriptType>,
    pub return_type: CatscriptType,
    pub code: Vec<Instruction>,
    pub max_locals: usize,
}

#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub fields: Vec<FieldDefinition>,
    pub functions: FxHashMap<String, CompiledFunction>,
    pub main: CompiledFunction,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Program has no root node")]
    MissingProgram,
    #[error("Cannot compile syntax error at '{text}'")]
    SyntaxError { text: String },
    #[error("Node {node} has no resolved type")]
    Untyped { node: usize },
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Undefined function '{name}'")]
    UndefinedFunction { name: String },
}

type CompileResult<T> = Result<T, CompileError>;

/// Lowers a validated tree to stack-machine code.
///
/// Top-level `var` declarations become fields of the program object, every
/// other declaration gets a fresh local slot. `int` and `bool` values stay
/// unboxed until they meet a reference-typed destination.
pub fn compile(ast: &Ast) -> CompileResult<CompiledProgram> {
    let body = ast.program_body().ok_or(CompileError::MissingProgram)?;
    let mut compiler = Compiler {
        ast,
        fields: FxHashMap::default(),
        signatures: FxHashMap::default(),
    };

    let mut fields = Vec::new();
    let mut definitions = Vec::new();
    if let ProgramBody::Statements(statements) = body {
        for &id in statements {
            match ast.statement(id) {
                Some(Statement::Variable { name, .. }) => {
                    let ty = compiler.ty(id)?.clone();
                    fields.push(FieldDefinition {
                        name: name.clone(),
                        descriptor: Descriptor::of(&ty),
                    });
                    compiler.fields.insert(name.clone(), ty);
                }
                Some(Statement::Function(function)) => {
                    compiler.signatures.insert(
                        function.name.clone(),
                        (
                            function.params.iter().map(|param| param.ty.clone()).collect(),
                            function.return_type.clone(),
                        ),
                    );
                    definitions.push(function);
                }
                _ => {}
            }
        }
    }

    let mut functions = FxHashMap::default();
    for function in definitions {
        functions.insert(function.name.clone(), compiler.compile_function(function)?);
    }
    let main = compiler.compile_main(body)?;

    debug!(
        "compiled {} fields, {} functions, {} main instructions",
        fields.len(),
        functions.len(),
        main.code.len()
    );
    Ok(CompiledProgram {
        fields,
        functions,
        main,
    })
}

struct Compiler<'a> {
    ast: &'a Ast,
    fields: FxHashMap<String, CatscriptType>,
    signatures: FxHashMap<String, (Vec<CatscriptType>, CatscriptType)>,
}

impl<'a> Compiler<'a> {
    fn ty(&self, id: NodeId) -> CompileResult<&'a CatscriptType> {
        let ast = self.ast;
        ast.try_ty(id)
            .ok_or(CompileError::Untyped { node: id.index() })
    }

    fn compile_function(&self, function: &FunctionDefinition) -> CompileResult<CompiledFunction> {
        let mut generator = CodeGenerator::new(1);
        for param in &function.params {
            generator.declare_local(&param.name, param.ty.clone());
        }
        self.compile_block(&function.body, &mut generator)?;
        if function.return_type == CatscriptType::Void {
            generator.emit(Instruction::Return);
        }
        let (code, max_locals) = generator.finish();
        Ok(CompiledFunction {
            params: function.params.iter().map(|param| param.ty.clone()).collect(),
            return_type: function.return_type.clone(),
            code,
            max_locals,
        })
    }

    fn compile_main(&self, body: &ProgramBody) -> CompileResult<CompiledFunction> {
        let mut generator = CodeGenerator::new(1);
        match body {
            ProgramBody::Expression(expression) => {
                generator.emit(Instruction::ALoad(0));
                self.compile_expression(*expression, &mut generator)?;
                let ty = self.ty(*expression)?;
                if *ty == CatscriptType::Void {
                    generator.emit(Instruction::AConstNull);
                } else {
                    coerce(ty, &CatscriptType::Object, &mut generator);
                }
                generator.emit(Instruction::Invoke(Method::Print));
            }
            ProgramBody::Statements(statements) => {
                for &statement in statements {
                    self.compile_statement(statement, &mut generator)?;
                }
            }
        }
        generator.emit(Instruction::Return);
        let (code, max_locals) = generator.finish();
        Ok(CompiledFunction {
            params: Vec::new(),
            return_type: CatscriptType::Void,
            code,
            max_locals,
        })
    }

    fn compile_block(&self, body: &[NodeId], generator: &mut CodeGenerator) -> CompileResult<()> {
        generator.push_scope();
        for &statement in body {
            self.compile_statement(statement, generator)?;
        }
        generator.pop_scope();
        Ok(())
    }

    fn compile_statement(&self, id: NodeId, generator: &mut CodeGenerator) -> CompileResult<()> {
        let ast = self.ast;
        let Some(statement) = ast.statement(id) else {
            return self.compile_expression(id, generator);
        };
        match statement {
            Statement::Variable { name, value, .. } => {
                let target = self.ty(id)?;
                if ast.is_top_level(id) {
                    generator.emit(Instruction::ALoad(0));
                    self.compile_value(*value, target, generator)?;
                    generator.emit(Instruction::PutField {
                        name: name.clone(),
                        descriptor: Descriptor::of(target),
                    });
                } else {
                    self.compile_value(*value, target, generator)?;
                    let slot = generator.declare_local(name, target.clone());
                    generator.emit(store(target, slot));
                }
            }
            Statement::Assignment { name, value } => {
                if let Some(local) = generator.local(name).cloned() {
                    self.compile_value(*value, &local.ty, generator)?;
                    generator.emit(store(&local.ty, local.slot));
                } else {
                    let target = self
                        .fields
                        .get(name)
                        .ok_or_else(|| CompileError::UndefinedVariable { name: name.clone() })?;
                    generator.emit(Instruction::ALoad(0));
                    self.compile_value(*value, target, generator)?;
                    generator.emit(Instruction::PutField {
                        name: name.clone(),
                        descriptor: Descriptor::of(target),
                    });
                }
            }
            // Compiled separately into the function table.
            Statement::Function(_) => {}
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                let else_label = generator.fresh_label();
                let end_label = generator.fresh_label();
                self.compile_expression(*condition, generator)?;
                generator.emit(Instruction::IfEq(else_label));
                self.compile_block(then_body, generator)?;
                generator.emit(Instruction::Goto(end_label));
                generator.emit(Instruction::Label(else_label));
                if let Some(else_body) = else_body {
                    self.compile_block(else_body, generator)?;
                }
                generator.emit(Instruction::Label(end_label));
            }
            Statement::For {
                variable,
                iterable,
                body,
            } => {
                let variable_type = self.ty(id)?;
                let start_label = generator.fresh_label();
                let end_label = generator.fresh_label();

                self.compile_expression(*iterable, generator)?;
                generator.emit(Instruction::Invoke(Method::ListIterator));
                let iterator = generator.fresh_slot();
                generator.emit(Instruction::AStore(iterator));

                generator.emit(Instruction::Label(start_label));
                generator.emit(Instruction::ALoad(iterator));
                generator.emit(Instruction::Invoke(Method::IteratorHasNext));
                generator.emit(Instruction::IfEq(end_label));
                generator.emit(Instruction::ALoad(iterator));
                generator.emit(Instruction::Invoke(Method::IteratorNext));
                coerce(&CatscriptType::Object, variable_type, generator);

                generator.push_scope();
                let slot = generator.declare_local(variable, variable_type.clone());
                generator.emit(store(variable_type, slot));
                self.compile_block(body, generator)?;
                generator.pop_scope();

                generator.emit(Instruction::Goto(start_label));
                generator.emit(Instruction::Label(end_label));
            }
            Statement::Print(value) => {
                generator.emit(Instruction::ALoad(0));
                self.compile_value(*value, &CatscriptType::Object, generator)?;
                generator.emit(Instruction::Invoke(Method::Print));
            }
            Statement::Call(call) => {
                self.compile_expression(*call, generator)?;
                if *self.ty(*call)? != CatscriptType::Void {
                    generator.emit(Instruction::Pop);
                }
            }
            Statement::Return(value) => {
                let void = CatscriptType::Void;
                let return_type = ast
                    .enclosing_function(id)
                    .and_then(|function| match ast.statement(function) {
                        Some(Statement::Function(function)) => Some(&function.return_type),
                        _ => None,
                    })
                    .unwrap_or(&void);
                match value {
                    Some(value) => {
                        self.compile_value(*value, return_type, generator)?;
                        generator.emit(if return_type.is_primitive() {
                            Instruction::IReturn
                        } else {
                            Instruction::AReturn
                        });
                    }
                    None => generator.emit(Instruction::Return),
                }
            }
            Statement::SyntaxError(text) => {
                return Err(CompileError::SyntaxError { text: text.clone() });
            }
        }
        Ok(())
    }

    /// Compiles `id` and converts the result to the representation of `target`.
    fn compile_value(
        &self,
        id: NodeId,
        target: &CatscriptType,
        generator: &mut CodeGenerator,
    ) -> CompileResult<()> {
        self.compile_expression(id, generator)?;
        coerce(self.ty(id)?, target, generator);
        Ok(())
    }

    fn compile_expression(&self, id: NodeId, generator: &mut CodeGenerator) -> CompileResult<()> {
        let ast = self.ast;
        let Some(expression) = ast.expression(id) else {
            return Err(CompileError::SyntaxError {
                text: format!("{:?}", ast.kind(id)),
            });
        };
        match expression {
            Expression::Identifier(name) => {
                if let Some(local) = generator.local(name) {
                    let load = if local.ty.is_primitive() {
                        Instruction::ILoad(local.slot)
                    } else {
                        Instruction::ALoad(local.slot)
                    };
                    generator.emit(load);
                } else {
                    let ty = self
                        .fields
                        .get(name)
                        .ok_or_else(|| CompileError::UndefinedVariable { name: name.clone() })?;
                    generator.emit(Instruction::ALoad(0));
                    generator.emit(Instruction::GetField {
                        name: name.clone(),
                        descriptor: Descriptor::of(ty),
                    });
                }
            }
            Expression::Integer(value) => generator.emit(Instruction::IConst(*value)),
            Expression::String(value) => generator.emit(Instruction::Ldc(value.clone())),
            Expression::Boolean(value) => generator.emit(Instruction::IConst(i64::from(*value))),
            Expression::Null => generator.emit(Instruction::AConstNull),
            Expression::List(items) => {
                generator.emit(Instruction::NewList);
                for &item in items {
                    generator.emit(Instruction::Dup);
                    self.compile_value(item, &CatscriptType::Object, generator)?;
                    generator.emit(Instruction::Invoke(Method::ListAdd));
                    generator.emit(Instruction::Pop);
                }
            }
            Expression::Parenthesized(inner) => self.compile_expression(*inner, generator)?,
            Expression::Unary { op, operand } => {
                self.compile_expression(*operand, generator)?;
                match op {
                    UnaryOperator::Negate => generator.emit(Instruction::INeg),
                    UnaryOperator::Not => {
                        generator.emit(Instruction::IConst(1));
                        generator.emit(Instruction::IXor);
                    }
                }
            }
            Expression::Binary { op, left, right } => {
                if *op == BinaryOperator::Add && *self.ty(id)? == CatscriptType::String {
                    self.compile_string_operand(*left, generator)?;
                    self.compile_string_operand(*right, generator)?;
                    generator.emit(Instruction::Invoke(Method::StringConcat));
                } else {
                    self.compile_expression(*left, generator)?;
                    self.compile_expression(*right, generator)?;
                    generator.emit(match op {
                        BinaryOperator::Add => Instruction::IAdd,
                        BinaryOperator::Sub => Instruction::ISub,
                        BinaryOperator::Mul => Instruction::IMul,
                        BinaryOperator::Div => Instruction::IDiv,
                    });
                }
            }
            Expression::Comparison { op, left, right } => {
                self.compile_expression(*left, generator)?;
                self.compile_expression(*right, generator)?;
                let condition = match op {
                    ComparisonOperator::Less => Condition::Less,
                    ComparisonOperator::LessEqual => Condition::LessEqual,
                    ComparisonOperator::Greater => Condition::Greater,
                    ComparisonOperator::GreaterEqual => Condition::GreaterEqual,
                };
                push_condition(condition, generator);
            }
            Expression::Equality { op, left, right } => {
                let left_type = self.ty(*left)?;
                // Raw int comparison only when both sides share one primitive
                // type; `1 == true` must compare as boxed values.
                if left_type.is_primitive() && left_type == self.ty(*right)? {
                    self.compile_expression(*left, generator)?;
                    self.compile_expression(*right, generator)?;
                    push_condition(
                        match op {
                            EqualityOperator::Equal => Condition::Equal,
                            EqualityOperator::NotEqual => Condition::NotEqual,
                        },
                        generator,
                    );
                } else {
                    self.compile_value(*left, &CatscriptType::Object, generator)?;
                    self.compile_value(*right, &CatscriptType::Object, generator)?;
                    generator.emit(Instruction::Invoke(Method::ObjectsEquals));
                    if *op == EqualityOperator::NotEqual {
                        generator.emit(Instruction::IConst(1));
                        generator.emit(Instruction::IXor);
                    }
                }
            }
            Expression::Call { name, args } => {
                let (params, return_type) = self
                    .signatures
                    .get(name)
                    .ok_or_else(|| CompileError::UndefinedFunction { name: name.clone() })?;
                generator.emit(Instruction::ALoad(0));
                for (&arg, param) in args.iter().zip(params) {
                    self.compile_value(arg, param, generator)?;
                }
                generator.emit(Instruction::InvokeFunction {
                    name: name.clone(),
                    argc: args.len(),
                    returns: *return_type != CatscriptType::Void,
                });
            }
            Expression::SyntaxError(text) => {
                return Err(CompileError::SyntaxError { text: text.clone() });
            }
        }
        Ok(())
    }

    fn compile_string_operand(&self, id: NodeId, generator: &mut CodeGenerator) -> CompileResult<()> {
        self.compile_value(id, &CatscriptType::Object, generator)?;
        generator.emit(Instruction::Invoke(Method::StringValueOf));
        Ok(())
    }
}

/// Leaves 1 on the stack if the two ints on top satisfy `condition`, else 0.
fn push_condition(condition: Condition, generator: &mut CodeGenerator) {
    let true_label = generator.fresh_label();
    let end_label = generator.fresh_label();
    generator.emit(Instruction::IfICmp(condition, true_label));
    generator.emit(Instruction::IConst(0));
    generator.emit(Instruction::Goto(end_label));
    generator.emit(Instruction::Label(true_label));
    generator.emit(Instruction::IConst(1));
    generator.emit(Instruction::Label(end_label));
}

fn primitive(ty: &CatscriptType) -> Option<Primitive> {
    match ty {
        CatscriptType::Int => Some(Primitive::Int),
        CatscriptType::Boolean => Some(Primitive::Boolean),
        _ => None,
    }
}

/// Converts the value on top of the stack from `from`'s representation to
/// `to`'s, boxing or checking and unboxing as needed.
fn coerce(from: &CatscriptType, to: &CatscriptType, generator: &mut CodeGenerator) {
    match (primitive(from), primitive(to)) {
        (Some(boxed), None) => generator.emit(Instruction::Box(boxed)),
        (None, Some(unboxed)) => {
            generator.emit(Instruction::CheckCast(to.clone()));
            generator.emit(Instruction::Unbox(unboxed));
        }
        (None, None) if !to.is_assignable_from(from) => {
            generator.emit(Instruction::CheckCast(to.clone()));
        }
        _ => {}
    }
}

fn store(ty: &CatscriptType, slot: Slot) -> Instruction {
    if ty.is_primitive() {
        Instruction::IStore(slot)
    } else {
        Instruction::AStore(slot)
    }
}

impl fmt::Display for CompiledProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in &self.fields {
            writeln!(f, "field {}: {:?}", field.name, field.descriptor)?;
        }
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        for name in names {
            let function = &self.functions[name];
            let params: Vec<_> = function.params.iter().map(ToString::to_string).collect();
            writeln!(
                f,
                "function {name}({}) : {} [locals: {}]",
                params.join(", "),
                function.return_type,
                function.max_locals
            )?;
            write_code(f, &function.code)?;
        }
        writeln!(f, "main [locals: {}]", self.main.max_locals)?;
        write_code(f, &self.main.code)
    }
}

fn write_code(f: &mut fmt::Formatter<'_>, code: &[Instruction]) -> fmt::Result {
    for (index, instruction) in code.iter().enumerate() {
        writeln!(f, "  {index:4}: {instruction:?}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend;
    use indoc::indoc;

    fn compiled(source: &str) -> CompiledProgram {
        let ast = frontend::load(source).expect("valid program");
        compile(&ast).expect("compile should succeed")
    }

    #[test]
    fn top_level_variables_become_fields() {
        let program = compiled(indoc! {"
            var count = 1
            var names = [\"a\"]
            if (true) { var local = 2 print(local) }
        "});
        assert_eq!(
            program.fields,
            vec![
                FieldDefinition {
                    name: "count".to_string(),
                    descriptor: Descriptor::Int
                },
                FieldDefinition {
                    name: "names".to_string(),
                    descriptor: Descriptor::Reference
                },
            ]
        );
        assert!(program.main.code.contains(&Instruction::IStore(1)));
        assert!(program.main.code.contains(&Instruction::ILoad(1)));
    }

    #[test]
    fn parameters_start_at_slot_one() {
        let program = compiled(indoc! {"
            function add(a : int, b : int) : int { return a + b }
            print(add(1, 2))
        "});
        let add = &program.functions["add"];
        assert_eq!(
            add.code,
            vec![
                Instruction::ILoad(1),
                Instruction::ILoad(2),
                Instruction::IAdd,
                Instruction::IReturn,
            ]
        );
        assert_eq!(add.max_locals, 3);
        assert!(program.main.code.contains(&Instruction::InvokeFunction {
            name: "add".to_string(),
            argc: 2,
            returns: true,
        }));
    }

    #[test]
    fn list_elements_are_boxed() {
        let program = compiled("[1, true]");
        assert_eq!(
            program.main.code,
            vec![
                Instruction::ALoad(0),
                Instruction::NewList,
                Instruction::Dup,
                Instruction::IConst(1),
                Instruction::Box(Primitive::Int),
                Instruction::Invoke(Method::ListAdd),
                Instruction::Pop,
                Instruction::Dup,
                Instruction::IConst(1),
                Instruction::Box(Primitive::Boolean),
                Instruction::Invoke(Method::ListAdd),
                Instruction::Pop,
                Instruction::Invoke(Method::Print),
                Instruction::Return,
            ]
        );
    }

    #[test]
    fn comparison_uses_true_and_end_labels() {
        let program = compiled("1 < 2");
        assert_eq!(
            &program.main.code[1..9],
            &[
                Instruction::IConst(1),
                Instruction::IConst(2),
                Instruction::IfICmp(Condition::Less, Label(0)),
                Instruction::IConst(0),
                Instruction::Goto(Label(1)),
                Instruction::Label(Label(0)),
                Instruction::IConst(1),
                Instruction::Label(Label(1)),
            ]
        );
    }

    #[test]
    fn mixed_primitive_equality_boxes_both_sides() {
        let program = compiled("1 == true");
        assert_eq!(
            &program.main.code[1..6],
            &[
                Instruction::IConst(1),
                Instruction::Box(Primitive::Int),
                Instruction::IConst(1),
                Instruction::Box(Primitive::Boolean),
                Instruction::Invoke(Method::ObjectsEquals),
            ]
        );
        let same = compiled("true == false");
        assert!(same.main.code.contains(&Instruction::IfICmp(Condition::Equal, Label(0))));
    }

    #[test]
    fn for_loop_unboxes_with_component_type() {
        let program = compiled("for (x in [1, 2]) { print(x + 1) }");
        let code = &program.main.code;
        let next = code
            .iter()
            .position(|instruction| *instruction == Instruction::Invoke(Method::IteratorNext))
            .expect("iterator next");
        assert_eq!(
            &code[next + 1..next + 4],
            &[
                Instruction::CheckCast(CatscriptType::Int),
                Instruction::Unbox(Primitive::Int),
                Instruction::IStore(2),
            ]
        );
        assert!(code.contains(&Instruction::AStore(1)));
    }

    #[test]
    fn void_functions_end_with_return() {
        let program = compiled("function f() { print(1) }\nf()");
        assert_eq!(program.functions["f"].code.last(), Some(&Instruction::Return));
        assert!(!program.main.code.contains(&Instruction::Pop));
    }

    #[test]
    fn string_concatenation_converts_both_operands() {
        let program = compiled(r#"1 + "a""#);
        assert_eq!(
            &program.main.code[1..7],
            &[
                Instruction::IConst(1),
                Instruction::Box(Primitive::Int),
                Instruction::Invoke(Method::StringValueOf),
                Instruction::Ldc("a".to_string()),
                Instruction::Invoke(Method::StringValueOf),
                Instruction::Invoke(Method::StringConcat),
            ]
        );
    }

    #[test]
    fn refuses_syntax_errors() {
        let ast = frontend::analyze("print(1)\n)");
        assert_eq!(
            compile(&ast).map(|_| ()),
            Err(CompileError::SyntaxError {
                text: ")".to_string()
            })
        );
    }
}
