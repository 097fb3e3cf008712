use log::debug;

use crate::ast::{Ast, Expression, NodeId, NodeKind, ProgramBody, Statement};
use crate::diagnostic::{Diagnostic, ErrorKind};
use crate::lexer::tokenize;
use crate::token::{Span, Token, TokenKind, TokenList};

mod expression;
mod statement;

/// Deepest expression or block nesting the parser descends into. Anything
/// deeper becomes an unexpected-token diagnostic.
pub const MAX_NESTING: usize = 128;

/// The function whose body is being parsed; `return` is only a statement
/// start while one is active.
#[derive(Debug)]
pub(crate) struct FunctionContext {
    pub(crate) name: String,
}

/// Recursive-descent parser that never fails.
///
/// Problems are recorded as diagnostics on the nodes where they were found and
/// parsing continues, so the resulting tree always covers the whole input.
pub struct Parser<'a> {
    tokens: TokenList<'a>,
    ast: Ast,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: TokenList<'a>) -> Self {
        Self {
            tokens,
            ast: Ast::new(),
            depth: 0,
        }
    }

    /// Parses a program that is either a single expression spanning the whole
    /// input or a sequence of statements.
    pub fn parse_program(mut self) -> Ast {
        let start = self.tokens.current_token().span;

        if self.tokens.has_more_tokens() {
            let checkpoint = self.ast.len();
            let expression = self.parse_expression();
            if !self.tokens.has_more_tokens() {
                debug!("parsed input as an expression program");
                return self.finish_program(ProgramBody::Expression(expression), start);
            }
            self.ast.truncate(checkpoint);
            self.tokens.reset();
        }

        let mut statements = Vec::new();
        while self.tokens.has_more_tokens() {
            statements.push(self.parse_program_statement(None));
        }
        debug!("parsed {} top-level statements", statements.len());
        self.finish_program(ProgramBody::Statements(statements), start)
    }

    pub fn parse_expression_program(mut self) -> Ast {
        let start = self.tokens.current_token().span;
        let expression = self.parse_expression();
        self.finish_program(ProgramBody::Expression(expression), start)
    }

    fn finish_program(mut self, body: ProgramBody, start: Span) -> Ast {
        let span = start.to(self.tokens.current_token().span);
        let root = self.ast.push(NodeKind::Program(body), span);
        self.ast.set_root(root);
        self.ast
    }

    /// Consumes the current token if it has the expected kind. Otherwise
    /// records an unexpected-token diagnostic and returns the current token
    /// without consuming it.
    fn require(&mut self, kind: TokenKind, errors: &mut Vec<Diagnostic>) -> Token<'a> {
        let token = self.tokens.current_token();
        if token.kind == kind {
            self.tokens.consume_token()
        } else {
            errors.push(Diagnostic::new(ErrorKind::UnexpectedToken, token.span));
            token
        }
    }

    /// Runs `parse` one nesting level deeper. At the nesting limit the current
    /// token is consumed into a syntax error expression instead.
    fn nested(&mut self, parse: impl FnOnce(&mut Self) -> NodeId) -> NodeId {
        if self.depth >= MAX_NESTING {
            let token = self.tokens.consume_token();
            let error = Diagnostic::new(ErrorKind::UnexpectedToken, token.span);
            return self.push_expression(
                Expression::SyntaxError(token.text.to_string()),
                token.span,
                vec![error],
            );
        }
        self.depth += 1;
        let id = parse(self);
        self.depth -= 1;
        id
    }

    /// Span from `start` to the end of the most recently consumed token.
    fn span_from(&self, start: Span) -> Span {
        start.to(self.tokens.last_token().span)
    }

    fn push_expression(
        &mut self,
        expression: Expression,
        span: Span,
        errors: Vec<Diagnostic>,
    ) -> NodeId {
        self.push_node(NodeKind::Expression(expression), span, errors)
    }

    fn push_statement(
        &mut self,
        statement: Statement,
        span: Span,
        errors: Vec<Diagnostic>,
    ) -> NodeId {
        self.push_node(NodeKind::Statement(statement), span, errors)
    }

    fn push_node(&mut self, kind: NodeKind, span: Span, errors: Vec<Diagnostic>) -> NodeId {
        let id = self.ast.push(kind, span);
        for error in errors {
            self.ast.add_error_at(id, error.kind, error.span);
        }
        id
    }
}

pub fn parse(source: &str) -> Ast {
    Parser::new(tokenize(source)).parse_program()
}

/// Parses the whole input as one expression, without the statement fallback.
pub fn parse_as_expression(source: &str) -> Ast {
    Parser::new(tokenize(source)).parse_expression_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOperator, ComparisonOperator};
    use indoc::indoc;

    fn diagnostic_kinds(ast: &Ast) -> Vec<ErrorKind> {
        ast.diagnostics().iter().map(|d| d.kind).collect()
    }

    fn program_expression(ast: &Ast) -> &Expression {
        match ast.program_body() {
            Some(ProgramBody::Expression(id)) => ast.expression(*id).expect("expression node"),
            other => panic!("expected expression program, got {other:?}"),
        }
    }

    fn program_statements(ast: &Ast) -> Vec<&Statement> {
        match ast.program_body() {
            Some(ProgramBody::Statements(ids)) => ids
                .iter()
                .map(|id| ast.statement(*id).expect("statement node"))
                .collect(),
            other => panic!("expected statement program, got {other:?}"),
        }
    }

    #[test]
    fn parses_whole_input_expression_as_program() {
        let ast = parse("1 + 2 * 3");
        let Expression::Binary { op, right, .. } = program_expression(&ast) else {
            panic!("expected additive expression");
        };
        assert_eq!(*op, BinaryOperator::Add);
        assert!(matches!(
            ast.expression(*right),
            Some(Expression::Binary {
                op: BinaryOperator::Mul,
                ..
            })
        ));
        assert!(diagnostic_kinds(&ast).is_empty());
    }

    #[test]
    fn single_literal_and_call_are_expression_programs() {
        assert!(matches!(
            program_expression(&parse("1")),
            Expression::Integer(1)
        ));
        assert!(matches!(
            program_expression(&parse("foo(1)")),
            Expression::Call { name, args } if name == "foo" && args.len() == 1
        ));
    }

    #[test]
    fn falls_back_to_statements_without_leftover_nodes() {
        let source = indoc! {r#"
            var x = 1
            print(x)
        "#};
        let ast = parse(source);
        let statements = program_statements(&ast);
        assert!(matches!(statements[0], Statement::Variable { name, .. } if name == "x"));
        assert!(matches!(statements[1], Statement::Print(_)));
        // Variable, its literal, print, its identifier, and the program root.
        assert_eq!(ast.len(), 5);
        assert!(diagnostic_kinds(&ast).is_empty());
    }

    #[test]
    fn empty_input_is_an_empty_statement_program() {
        let ast = parse("  // nothing here\n");
        assert!(program_statements(&ast).is_empty());
        assert!(ast.diagnostics().is_empty());
    }

    #[test]
    fn unterminated_list_keeps_the_list_node() {
        let ast = parse("[1, 2");
        assert!(matches!(program_expression(&ast), Expression::List(items) if items.len() == 2));
        assert_eq!(diagnostic_kinds(&ast), vec![ErrorKind::UnterminatedList]);
    }

    #[test]
    fn comparison_is_left_associative() {
        let ast = parse_as_expression("1 < 2 < 3");
        let Expression::Comparison { op, left, .. } = program_expression(&ast) else {
            panic!("expected comparison");
        };
        assert_eq!(*op, ComparisonOperator::Less);
        assert!(matches!(
            ast.expression(*left),
            Some(Expression::Comparison { .. })
        ));
    }

    #[test]
    fn parse_as_expression_reports_trailing_garbage_as_syntax_error() {
        let ast = parse_as_expression("var");
        assert!(matches!(
            program_expression(&ast),
            Expression::SyntaxError(text) if text == "var"
        ));
        assert_eq!(diagnostic_kinds(&ast), vec![ErrorKind::UnexpectedToken]);
    }

    #[test]
    fn spans_cover_whole_constructs() {
        let ast = parse("var total = 10 + 20");
        let Some(ProgramBody::Statements(ids)) = ast.program_body() else {
            panic!("expected statements");
        };
        let span = ast.span(ids[0]);
        assert_eq!((span.start, span.end), (0, 19));
        let root = ast.root().expect("root");
        assert_eq!(ast.span(root).end, 19);
    }
}
