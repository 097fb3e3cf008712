pub mod ast;
pub mod backend;
pub mod bytecode;
pub mod diagnostic;
pub mod frontend;
pub mod interpreter;
pub mod lexer;
pub mod logger;
pub mod parser;
pub mod symbol_table;
pub mod token;
pub mod types;
pub mod validator;
pub mod vm;
