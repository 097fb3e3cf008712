use log::trace;

use crate::ast::{FunctionDefinition, NodeId, Parameter, Statement};
use crate::diagnostic::{Diagnostic, ErrorKind};
use crate::token::TokenKind;
use crate::types::CatscriptType;

use super::{FunctionContext, MAX_NESTING, Parser};

const STATEMENT_KEYWORDS: [TokenKind; 6] = [
    TokenKind::Var,
    TokenKind::Function,
    TokenKind::If,
    TokenKind::For,
    TokenKind::Print,
    TokenKind::Return,
];

impl<'a> Parser<'a> {
    /// Parses one statement, producing a syntax-error statement that wraps a
    /// single consumed token when nothing else matches.
    pub(super) fn parse_program_statement(&mut self, function: Option<&FunctionContext>) -> NodeId {
        if let Some(statement) = self.parse_statement(function) {
            return statement;
        }
        if let Some(function) = function
            && self.tokens.matches(&[TokenKind::Return])
        {
            return self.parse_return(function);
        }
        let token = self.tokens.consume_token();
        self.push_statement(
            Statement::SyntaxError(token.text.to_string()),
            token.span,
            vec![Diagnostic::new(ErrorKind::UnexpectedToken, token.span)],
        )
    }

    fn parse_statement(&mut self, function: Option<&FunctionContext>) -> Option<NodeId> {
        let statement = match self.tokens.current_token().kind {
            TokenKind::Var => self.parse_variable(),
            TokenKind::Function => self.parse_function(),
            TokenKind::If => self.parse_if(function),
            TokenKind::For => self.parse_for(function),
            TokenKind::Print => self.parse_print(),
            TokenKind::Identifier => {
                let name = self.tokens.consume_token();
                if self.tokens.match_and_consume(TokenKind::Equal) {
                    let value = self.parse_expression();
                    let span = self.span_from(name.span);
                    self.push_statement(
                        Statement::Assignment {
                            name: name.text.to_string(),
                            value,
                        },
                        span,
                        Vec::new(),
                    )
                } else {
                    let call = self.parse_call(name);
                    let span = self.ast.span(call);
                    self.push_statement(Statement::Call(call), span, Vec::new())
                }
            }
            _ => return None,
        };
        Some(statement)
    }

    fn parse_variable(&mut self) -> NodeId {
        let start = self.tokens.consume_token();
        let mut errors = Vec::new();
        let name = self.require(TokenKind::Identifier, &mut errors);
        let explicit_type = if self.tokens.match_and_consume(TokenKind::Colon) {
            Some(self.parse_type_expression(&mut errors))
        } else {
            None
        };
        self.require(TokenKind::Equal, &mut errors);
        let value = self.parse_expression();
        let span = self.span_from(start.span);
        self.push_statement(
            Statement::Variable {
                name: name.text.to_string(),
                explicit_type,
                value,
            },
            span,
            errors,
        )
    }

    fn parse_function(&mut self) -> NodeId {
        let start = self.tokens.consume_token();
        let mut errors = Vec::new();
        let name = self.require(TokenKind::Identifier, &mut errors).text.to_string();

        self.require(TokenKind::LParen, &mut errors);
        let mut params = Vec::new();
        if !self.tokens.matches(&[TokenKind::RParen]) {
            loop {
                let param = self.require(TokenKind::Identifier, &mut errors);
                let ty = if self.tokens.match_and_consume(TokenKind::Colon) {
                    self.parse_type_expression(&mut errors)
                } else {
                    CatscriptType::Object
                };
                params.push(Parameter {
                    name: param.text.to_string(),
                    ty,
                });
                if !self.tokens.match_and_consume(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.require(TokenKind::RParen, &mut errors);

        let return_type = if self.tokens.match_and_consume(TokenKind::Colon) {
            self.parse_type_expression(&mut errors)
        } else {
            CatscriptType::Void
        };

        trace!("parsing body of function {name}");
        let context = FunctionContext { name: name.clone() };
        let body = self.parse_block(Some(&context), &mut errors);
        let span = self.span_from(start.span);
        self.push_statement(
            Statement::Function(FunctionDefinition {
                name,
                params,
                return_type,
                body,
            }),
            span,
            errors,
        )
    }

    fn parse_if(&mut self, function: Option<&FunctionContext>) -> NodeId {
        let start = self.tokens.consume_token();
        let mut errors = Vec::new();
        self.require(TokenKind::LParen, &mut errors);
        let condition = self.parse_expression();
        self.require(TokenKind::RParen, &mut errors);
        let then_body = self.parse_block(function, &mut errors);

        let else_body = if self.tokens.match_and_consume(TokenKind::Else) {
            if self.tokens.matches(&[TokenKind::If]) {
                Some(vec![self.parse_if(function)])
            } else {
                Some(self.parse_block(function, &mut errors))
            }
        } else {
            None
        };

        let span = self.span_from(start.span);
        self.push_statement(
            Statement::If {
                condition,
                then_body,
                else_body,
            },
            span,
            errors,
        )
    }

    fn parse_for(&mut self, function: Option<&FunctionContext>) -> NodeId {
        let start = self.tokens.consume_token();
        let mut errors = Vec::new();
        self.require(TokenKind::LParen, &mut errors);
        let variable = self.require(TokenKind::Identifier, &mut errors);
        self.require(TokenKind::In, &mut errors);
        let iterable = self.parse_expression();
        self.require(TokenKind::RParen, &mut errors);
        let body = self.parse_block(function, &mut errors);
        let span = self.span_from(start.span);
        self.push_statement(
            Statement::For {
                variable: variable.text.to_string(),
                iterable,
                body,
            },
            span,
            errors,
        )
    }

    fn parse_print(&mut self) -> NodeId {
        let start = self.tokens.consume_token();
        let mut errors = Vec::new();
        self.require(TokenKind::LParen, &mut errors);
        let value = self.parse_expression();
        self.require(TokenKind::RParen, &mut errors);
        let span = self.span_from(start.span);
        self.push_statement(Statement::Print(value), span, errors)
    }

    fn parse_return(&mut self, function: &FunctionContext) -> NodeId {
        let start = self.tokens.consume_token();
        let has_value = !self.tokens.matches(&[TokenKind::RBrace, TokenKind::EOF])
            && !self.tokens.matches(&STATEMENT_KEYWORDS);
        let value = has_value.then(|| self.parse_expression());
        trace!("return in function {}", function.name);
        let span = self.span_from(start.span);
        self.push_statement(Statement::Return(value), span, Vec::new())
    }

    /// `{ statements }`; the statement loop also stops at end of input.
    fn parse_block(
        &mut self,
        function: Option<&FunctionContext>,
        errors: &mut Vec<Diagnostic>,
    ) -> Vec<NodeId> {
        if self.depth >= MAX_NESTING {
            errors.push(Diagnostic::new(
                ErrorKind::UnexpectedToken,
                self.tokens.current_token().span,
            ));
            return Vec::new();
        }
        self.require(TokenKind::LBrace, errors);
        self.depth += 1;
        let mut statements = Vec::new();
        while !self.tokens.matches(&[TokenKind::RBrace, TokenKind::EOF]) {
            statements.push(self.parse_program_statement(function));
        }
        self.depth -= 1;
        self.require(TokenKind::RBrace, errors);
        statements
    }
}
