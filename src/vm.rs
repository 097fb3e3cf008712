use std::cell::{Cell, RefCell};
use std::rc::Rc;

use anyhow::Result;
use log::{debug, trace};
use rustc_hash::FxHashMap;

use crate::ast::Ast;
use crate::backend::{Backend, PreparedBackend, on_execution_stack};
use crate::bytecode::{
    CompiledFunction, CompiledProgram, Condition, Descriptor, Instruction, Label, Method,
    Primitive, compile,
};

mod error;
mod value;

pub use error::VmError;
use value::{Object, StackValue};

type VmResult<T> = std::result::Result<T, VmError>;

pub const MAX_CALL_DEPTH: usize = 256;

/// Stack machine executing the bytecode backend's output.
pub struct VM;

impl VM {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

/// A code block with its labels resolved to instruction offsets.
struct LinkedFunction {
    function: CompiledFunction,
    labels: FxHashMap<Label, usize>,
}

impl LinkedFunction {
    fn link(function: CompiledFunction) -> VmResult<Self> {
        let mut labels = FxHashMap::default();
        for (offset, instruction) in function.code.iter().enumerate() {
            if let Instruction::Label(label) = instruction {
                labels.insert(*label, offset);
            }
        }
        for instruction in &function.code {
            if let Instruction::IfICmp(_, label)
            | Instruction::IfEq(label)
            | Instruction::Goto(label) = instruction
                && !labels.contains_key(label)
            {
                return Err(VmError::UndefinedLabel { label: label.0 });
            }
        }
        Ok(Self { function, labels })
    }

    fn target(&self, label: Label) -> VmResult<usize> {
        self.labels
            .get(&label)
            .copied()
            .ok_or(VmError::UndefinedLabel { label: label.0 })
    }
}

/// Compiled and linked program, ready to run any number of times.
pub struct PreparedVM {
    fields: Vec<(String, Descriptor)>,
    functions: FxHashMap<String, LinkedFunction>,
    main: LinkedFunction,
}

impl PreparedVM {
    pub fn link(program: CompiledProgram) -> std::result::Result<Self, VmError> {
        let fields = program
            .fields
            .into_iter()
            .map(|field| (field.name, field.descriptor))
            .collect();
        let functions = program
            .functions
            .into_iter()
            .map(|(name, function)| Ok((name, LinkedFunction::link(function)?)))
            .collect::<VmResult<_>>()?;
        Ok(Self {
            fields,
            functions,
            main: LinkedFunction::link(program.main)?,
        })
    }

    /// Runs on the caller's thread, appending printed lines to `output`.
    pub fn run_with_output(&self, output: &mut String) -> std::result::Result<(), VmError> {
        let mut machine = Machine {
            program: self,
            fields: self
                .fields
                .iter()
                .map(|(name, descriptor)| (name.clone(), default_value(*descriptor)))
                .collect(),
            output,
            depth: 0,
        };
        machine.execute(&self.main, vec![StackValue::Ref(Object::Program)])?;
        Ok(())
    }
}

impl PreparedBackend for PreparedVM {
    fn run_into(&self, output: &mut String) -> Result<()> {
        Ok(on_execution_stack(|| self.run_with_output(output))??)
    }
}

impl Backend for VM {
    fn name(&self) -> &'static str {
        "vm"
    }

    fn prepare(&self, ast: &Ast) -> Result<Box<dyn PreparedBackend>> {
        let program = compile(ast)?;
        debug!(
            "vm linking {} functions and {} fields",
            program.functions.len(),
            program.fields.len()
        );
        Ok(Box::new(PreparedVM::link(program)?))
    }
}

fn default_value(descriptor: Descriptor) -> StackValue {
    match descriptor {
        Descriptor::Int => StackValue::Int(0),
        Descriptor::Reference => StackValue::Ref(Object::Null),
    }
}

struct Machine<'a> {
    program: &'a PreparedVM,
    fields: FxHashMap<String, StackValue>,
    output: &'a mut String,
    depth: usize,
}

impl<'a> Machine<'a> {
    /// Runs one code block. `arguments` fill the first local slots, starting
    /// with the program object in slot 0.
    fn execute(
        &mut self,
        block: &'a LinkedFunction,
        arguments: Vec<StackValue>,
    ) -> VmResult<Option<StackValue>> {
        let function = &block.function;
        let mut locals = arguments;
        if locals.len() < function.max_locals {
            locals.resize(function.max_locals, StackValue::Ref(Object::Null));
        }
        let mut stack: Vec<StackValue> = Vec::new();
        let mut ip = 0;

        while let Some(instruction) = function.code.get(ip) {
            ip += 1;
            match instruction {
                Instruction::IConst(value) => stack.push(StackValue::Int(*value)),
                Instruction::Ldc(value) => {
                    stack.push(StackValue::Ref(Object::String(Rc::from(value.as_str()))))
                }
                Instruction::AConstNull => stack.push(StackValue::Ref(Object::Null)),
                Instruction::ILoad(slot) => {
                    let value = load(&locals, *slot)?.into_int()?;
                    stack.push(StackValue::Int(value));
                }
                Instruction::ALoad(slot) => {
                    let value = load(&locals, *slot)?.into_ref()?;
                    stack.push(StackValue::Ref(value));
                }
                Instruction::IStore(slot) => {
                    let value = pop(&mut stack)?.into_int()?;
                    *slot_mut(&mut locals, *slot)? = StackValue::Int(value);
                }
                Instruction::AStore(slot) => {
                    let value = pop(&mut stack)?.into_ref()?;
                    *slot_mut(&mut locals, *slot)? = StackValue::Ref(value);
                }
                Instruction::GetField { name, descriptor } => {
                    expect_program(pop(&mut stack)?.into_ref()?)?;
                    let value = self
                        .fields
                        .get(name)
                        .cloned()
                        .ok_or_else(|| VmError::UndefinedField { name: name.clone() })?;
                    stack.push(check_descriptor(value, *descriptor)?);
                }
                Instruction::PutField { name, descriptor } => {
                    let value = check_descriptor(pop(&mut stack)?, *descriptor)?;
                    expect_program(pop(&mut stack)?.into_ref()?)?;
                    let field = self
                        .fields
                        .get_mut(name)
                        .ok_or_else(|| VmError::UndefinedField { name: name.clone() })?;
                    *field = value;
                }
                Instruction::IAdd => binary_int(&mut stack, |a, b| Ok(a.wrapping_add(b)))?,
                Instruction::ISub => binary_int(&mut stack, |a, b| Ok(a.wrapping_sub(b)))?,
                Instruction::IMul => binary_int(&mut stack, |a, b| Ok(a.wrapping_mul(b)))?,
                Instruction::IDiv => binary_int(&mut stack, |a, b| {
                    if b == 0 {
                        Err(VmError::DivisionByZero)
                    } else {
                        Ok(a.wrapping_div(b))
                    }
                })?,
                Instruction::IXor => binary_int(&mut stack, |a, b| Ok(a ^ b))?,
                Instruction::INeg => {
                    let value = pop(&mut stack)?.into_int()?;
                    stack.push(StackValue::Int(value.wrapping_neg()));
                }
                Instruction::IfICmp(condition, label) => {
                    let right = pop(&mut stack)?.into_int()?;
                    let left = pop(&mut stack)?.into_int()?;
                    let taken = match condition {
                        Condition::Equal => left == right,
                        Condition::NotEqual => left != right,
                        Condition::Less => left < right,
                        Condition::LessEqual => left <= right,
                        Condition::Greater => left > right,
                        Condition::GreaterEqual => left >= right,
                    };
                    if taken {
                        ip = block.target(*label)?;
                    }
                }
                Instruction::IfEq(label) => {
                    if pop(&mut stack)?.into_int()? == 0 {
                        ip = block.target(*label)?;
                    }
                }
                Instruction::Goto(label) => ip = block.target(*label)?,
                Instruction::Label(_) => {}
                Instruction::Dup => {
                    let top = stack.last().cloned().ok_or(VmError::StackUnderflow)?;
                    stack.push(top);
                }
                Instruction::Pop => {
                    pop(&mut stack)?;
                }
                Instruction::NewList => {
                    stack.push(StackValue::Ref(Object::List(Rc::new(RefCell::new(
                        Vec::new(),
                    )))));
                }
                Instruction::Invoke(method) => self.invoke(*method, &mut stack)?,
                Instruction::InvokeFunction {
                    name,
                    argc,
                    returns,
                } => {
                    if stack.len() < argc + 1 {
                        return Err(VmError::StackUnderflow);
                    }
                    let arguments = stack.split_off(stack.len() - (argc + 1));
                    let result = self.call(name, arguments)?;
                    if *returns {
                        stack.push(result.ok_or(VmError::MissingReturn)?);
                    }
                }
                Instruction::CheckCast(ty) => {
                    let object = pop(&mut stack)?.into_ref()?;
                    if !object.is_instance_of(ty) {
                        return Err(VmError::ClassCast {
                            expected: ty.to_string(),
                            got: object.type_name(),
                        });
                    }
                    stack.push(StackValue::Ref(object));
                }
                Instruction::Box(primitive) => {
                    let value = pop(&mut stack)?.into_int()?;
                    let object = match primitive {
                        Primitive::Int => Object::Integer(value),
                        Primitive::Boolean => Object::Boolean(value != 0),
                    };
                    stack.push(StackValue::Ref(object));
                }
                Instruction::Unbox(primitive) => {
                    let object = pop(&mut stack)?.into_ref()?;
                    let value = match (primitive, object) {
                        (Primitive::Int, Object::Integer(value)) => value,
                        (Primitive::Boolean, Object::Boolean(value)) => i64::from(value),
                        (_, Object::Null) => return Err(VmError::NullReference),
                        (primitive, other) => {
                            return Err(VmError::ClassCast {
                                expected: format!("{primitive:?}"),
                                got: other.type_name(),
                            });
                        }
                    };
                    stack.push(StackValue::Int(value));
                }
                Instruction::IReturn => {
                    let value = pop(&mut stack)?.into_int()?;
                    return Ok(Some(StackValue::Int(value)));
                }
                Instruction::AReturn => {
                    let value = pop(&mut stack)?.into_ref()?;
                    return Ok(Some(StackValue::Ref(value)));
                }
                Instruction::Return => return Ok(None),
            }
        }
        Err(VmError::MissingReturn)
    }

    fn call(&mut self, name: &str, arguments: Vec<StackValue>) -> VmResult<Option<StackValue>> {
        let program = self.program;
        let callee = program
            .functions
            .get(name)
            .ok_or_else(|| VmError::UndefinedFunction {
                name: name.to_string(),
            })?;
        let expected = callee.function.params.len();
        if arguments.len() != expected + 1 {
            return Err(VmError::FunctionArityMismatch {
                name: name.to_string(),
                expected,
                found: arguments.len().saturating_sub(1),
            });
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(VmError::CallDepthExceeded {
                limit: MAX_CALL_DEPTH,
            });
        }
        trace!("vm call {name} at depth {}", self.depth);
        self.depth += 1;
        let result = self.execute(callee, arguments);
        self.depth -= 1;
        result
    }

    fn invoke(&mut self, method: Method, stack: &mut Vec<StackValue>) -> VmResult<()> {
        match method {
            Method::ListAdd => {
                let item = pop(stack)?.into_ref()?;
                let list = pop(stack)?.into_ref()?;
                list.as_list()?.borrow_mut().push(item);
                stack.push(StackValue::Int(1));
            }
            Method::ListIterator => {
                let list = pop(stack)?.into_ref()?;
                let list = Rc::clone(list.as_list()?);
                stack.push(StackValue::Ref(Object::Iterator {
                    list,
                    position: Rc::new(Cell::new(0)),
                }));
            }
            Method::IteratorHasNext => {
                let (list, position) = pop_iterator(stack)?;
                let has_next = position.get() < list.borrow().len();
                stack.push(StackValue::Int(i64::from(has_next)));
            }
            Method::IteratorNext => {
                let (list, position) = pop_iterator(stack)?;
                let index = position.get();
                let item = list
                    .borrow()
                    .get(index)
                    .cloned()
                    .ok_or(VmError::IteratorExhausted)?;
                position.set(index + 1);
                stack.push(StackValue::Ref(item));
            }
            Method::StringValueOf => {
                let object = pop(stack)?.into_ref()?;
                stack.push(StackValue::Ref(Object::String(Rc::from(
                    object.to_string().as_str(),
                ))));
            }
            Method::StringConcat => {
                let right = pop(stack)?.into_ref()?;
                let left = pop(stack)?.into_ref()?;
                let (Object::String(left), Object::String(right)) = (&left, &right) else {
                    return Err(VmError::ClassCast {
                        expected: "String".to_string(),
                        got: if matches!(left, Object::String(_)) {
                            right.type_name()
                        } else {
                            left.type_name()
                        },
                    });
                };
                let joined = format!("{left}{right}");
                stack.push(StackValue::Ref(Object::String(Rc::from(joined.as_str()))));
            }
            Method::ObjectsEquals => {
                let right = pop(stack)?.into_ref()?;
                let left = pop(stack)?.into_ref()?;
                stack.push(StackValue::Int(i64::from(left == right)));
            }
            Method::Print => {
                let value = pop(stack)?.into_ref()?;
                expect_program(pop(stack)?.into_ref()?)?;
                self.output.push_str(&value.to_string());
                self.output.push('\n');
            }
        }
        Ok(())
    }
}

fn pop(stack: &mut Vec<StackValue>) -> VmResult<StackValue> {
    stack.pop().ok_or(VmError::StackUnderflow)
}

fn pop_iterator(stack: &mut Vec<StackValue>) -> VmResult<(value::ListRef, Rc<Cell<usize>>)> {
    match pop(stack)?.into_ref()? {
        Object::Iterator { list, position } => Ok((list, position)),
        Object::Null => Err(VmError::NullReference),
        other => Err(VmError::ClassCast {
            expected: "Iterator".to_string(),
            got: other.type_name(),
        }),
    }
}

fn load(locals: &[StackValue], slot: usize) -> VmResult<StackValue> {
    locals
        .get(slot)
        .cloned()
        .ok_or(VmError::InvalidSlot { slot })
}

fn slot_mut(locals: &mut [StackValue], slot: usize) -> VmResult<&mut StackValue> {
    locals.get_mut(slot).ok_or(VmError::InvalidSlot { slot })
}

fn expect_program(object: Object) -> VmResult<()> {
    match object {
        Object::Program => Ok(()),
        Object::Null => Err(VmError::NullReference),
        other => Err(VmError::ClassCast {
            expected: "program".to_string(),
            got: other.type_name(),
        }),
    }
}

fn check_descriptor(value: StackValue, descriptor: Descriptor) -> VmResult<StackValue> {
    match descriptor {
        Descriptor::Int => value.into_int().map(StackValue::Int),
        Descriptor::Reference => value.into_ref().map(StackValue::Ref),
    }
}

fn binary_int(
    stack: &mut Vec<StackValue>,
    operation: impl FnOnce(i64, i64) -> VmResult<i64>,
) -> VmResult<()> {
    let right = pop(stack)?.into_int()?;
    let left = pop(stack)?.into_int()?;
    stack.push(StackValue::Int(operation(left, right)?));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::FieldDefinition;
    use crate::frontend;
    use crate::types::CatscriptType;
    use indoc::indoc;

    fn run_source(source: &str) -> anyhow::Result<String> {
        let ast = frontend::load(source)?;
        VM::new().run(&ast)
    }

    fn expect_vm_error(error: anyhow::Error) -> VmError {
        error.downcast::<VmError>().expect("expected VmError")
    }

    fn main_only(code: Vec<Instruction>) -> CompiledProgram {
        CompiledProgram {
            fields: Vec::new(),
            functions: FxHashMap::default(),
            main: CompiledFunction {
                params: Vec::new(),
                return_type: CatscriptType::Void,
                code,
                max_locals: 1,
            },
        }
    }

    fn run_program(program: CompiledProgram) -> std::result::Result<String, VmError> {
        let mut output = String::new();
        PreparedVM::link(program)?.run_with_output(&mut output)?;
        Ok(output)
    }

    fn run_code(code: Vec<Instruction>) -> std::result::Result<String, VmError> {
        run_program(main_only(code))
    }

    #[test]
    fn runs_function_with_for_loop() {
        let source = indoc! {"
            function foo(a : int) {
              for (x in [1, 2, 3, 4, 5]) {
                print(a + x + 2)
              }
            }
            foo(5)
        "};
        assert_eq!(run_source(source).expect("run failed"), "8\n9\n10\n11\n12\n");
    }

    #[test]
    fn globals_live_in_fields() {
        let source = indoc! {"
            var total = 0
            function add(n : int) { total = total + n }
            for (i in [1, 2, 3]) { add(i) }
            print(total)
        "};
        assert_eq!(run_source(source).expect("run failed"), "6\n");
    }

    #[test]
    fn recursion_uses_fresh_frames() {
        let source = indoc! {"
            function fib(n : int) : int {
              if (n < 2) { return n }
              return fib(n - 1) + fib(n - 2)
            }
            print(fib(10))
        "};
        assert_eq!(run_source(source).expect("run failed"), "55\n");
    }

    #[test]
    fn object_values_round_trip_through_boxes() {
        let source = indoc! {r#"
            function id(o) : object { return o }
            var items : list<object> = [1, "two", [3]]
            for (item in items) { print(id(item)) }
            print(id(true) == true)
            print(1 != 2)
        "#};
        assert_eq!(
            run_source(source).expect("run failed"),
            "1\ntwo\n[3]\ntrue\ntrue\n"
        );
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let error = run_source("print(10 / (5 - 5))").expect_err("division should fail");
        assert_eq!(expect_vm_error(error), VmError::DivisionByZero);
    }

    #[test]
    fn arithmetic_on_a_reference_is_rejected() {
        let result = run_code(vec![
            Instruction::IConst(1),
            Instruction::Ldc("one".to_string()),
            Instruction::IAdd,
            Instruction::Return,
        ]);
        assert_eq!(
            result,
            Err(VmError::TypeMismatch {
                expected: "int",
                got: "String"
            })
        );
    }

    #[test]
    fn unboxing_null_is_rejected() {
        let result = run_code(vec![
            Instruction::AConstNull,
            Instruction::CheckCast(CatscriptType::Int),
            Instruction::Unbox(Primitive::Int),
            Instruction::Return,
        ]);
        assert_eq!(result, Err(VmError::NullReference));
    }

    #[test]
    fn undefined_labels_fail_to_link() {
        let result = PreparedVM::link(main_only(vec![Instruction::Goto(Label(7))]));
        assert!(matches!(result, Err(VmError::UndefinedLabel { label: 7 })));
    }

    #[test]
    fn fields_start_with_default_values() {
        let mut program = main_only(vec![
            Instruction::ALoad(0),
            Instruction::ALoad(0),
            Instruction::GetField {
                name: "count".to_string(),
                descriptor: Descriptor::Int,
            },
            Instruction::Box(Primitive::Int),
            Instruction::Invoke(Method::Print),
            Instruction::Return,
        ]);
        program.fields.push(FieldDefinition {
            name: "count".to_string(),
            descriptor: Descriptor::Int,
        });
        let output = run_program(program).expect("run failed");
        assert_eq!(output, "0\n");
    }

    #[test]
    fn mixed_primitive_equality_compares_boxed_values() {
        let source = indoc! {"
            print(1 == true)
            print(0 != false)
            print(true == true)
            print(2 == 2)
        "};
        assert_eq!(
            run_source(source).expect("run failed"),
            "false\ntrue\ntrue\ntrue\n"
        );
    }

    #[test]
    fn null_cannot_be_unboxed_into_primitive_storage() {
        for source in [
            "for (x in [null, 1]) { print(x) }",
            "function f(a : int) { print(a) }\nf(null)",
            "var x : int = null",
        ] {
            let error = run_source(source).expect_err("null should fail");
            assert_eq!(expect_vm_error(error), VmError::NullReference, "{source}");
        }
    }

    #[test]
    fn output_before_a_runtime_error_is_kept() {
        let ast = frontend::load("print(1)\nprint(1 / 0)").expect("valid program");
        let prepared = VM::new().prepare(&ast).expect("prepare");
        let mut output = String::new();
        let error = prepared.run_into(&mut output).expect_err("division should fail");
        assert_eq!(output, "1\n");
        assert_eq!(expect_vm_error(error), VmError::DivisionByZero);
    }

    #[test]
    fn deep_recursion_runs_on_the_execution_stack() {
        let source = indoc! {"
            function count(n : int) : int {
              if (n == 0) { return 0 }
              return count(n - 1) + 1
            }
            print(count(200))
        "};
        assert_eq!(run_source(source).expect("run failed"), "200\n");
    }

    #[test]
    fn runaway_recursion_is_bounded() {
        let error = run_source("function f() { f() }\nf()").expect_err("recursion should fail");
        assert_eq!(
            expect_vm_error(error),
            VmError::CallDepthExceeded {
                limit: MAX_CALL_DEPTH
            }
        );
    }
}
