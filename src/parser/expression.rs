use crate::ast::{
    BinaryOperator, ComparisonOperator, EqualityOperator, Expression, NodeId, UnaryOperator,
};
use crate::diagnostic::{Diagnostic, ErrorKind};
use crate::token::{Token, TokenKind};
use crate::types::CatscriptType;

use super::Parser;

impl<'a> Parser<'a> {
    pub(super) fn parse_expression(&mut self) -> NodeId {
        self.nested(Self::parse_equality)
    }

    // Equality is right associative: `a == b == c` groups as `a == (b == c)`.
    fn parse_equality(&mut self) -> NodeId {
        let left = self.parse_comparison();
        let op = match self.tokens.current_token().kind {
            TokenKind::EqualEqual => EqualityOperator::Equal,
            TokenKind::BangEqual => EqualityOperator::NotEqual,
            _ => return left,
        };
        self.tokens.consume_token();
        let right = self.nested(Self::parse_equality);
        let span = self.ast.span(left).to(self.ast.span(right));
        self.push_expression(Expression::Equality { op, left, right }, span, Vec::new())
    }

    fn parse_comparison(&mut self) -> NodeId {
        let mut expression = self.parse_additive();
        loop {
            let op = match self.tokens.current_token().kind {
                TokenKind::Less => ComparisonOperator::Less,
                TokenKind::LessEqual => ComparisonOperator::LessEqual,
                TokenKind::Greater => ComparisonOperator::Greater,
                TokenKind::GreaterEqual => ComparisonOperator::GreaterEqual,
                _ => return expression,
            };
            self.tokens.consume_token();
            let right = self.parse_additive();
            let span = self.ast.span(expression).to(self.ast.span(right));
            expression = self.push_expression(
                Expression::Comparison {
                    op,
                    left: expression,
                    right,
                },
                span,
                Vec::new(),
            );
        }
    }

    fn parse_additive(&mut self) -> NodeId {
        let mut expression = self.parse_factor();
        loop {
            let op = match self.tokens.current_token().kind {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Sub,
                _ => return expression,
            };
            self.tokens.consume_token();
            let right = self.parse_factor();
            expression = self.push_binary(op, expression, right);
        }
    }

    fn parse_factor(&mut self) -> NodeId {
        let mut expression = self.parse_unary();
        loop {
            let op = match self.tokens.current_token().kind {
                TokenKind::Star => BinaryOperator::Mul,
                TokenKind::Slash => BinaryOperator::Div,
                _ => return expression,
            };
            self.tokens.consume_token();
            let right = self.parse_unary();
            expression = self.push_binary(op, expression, right);
        }
    }

    fn push_binary(&mut self, op: BinaryOperator, left: NodeId, right: NodeId) -> NodeId {
        let span = self.ast.span(left).to(self.ast.span(right));
        self.push_expression(Expression::Binary { op, left, right }, span, Vec::new())
    }

    fn parse_unary(&mut self) -> NodeId {
        let op = match self.tokens.current_token().kind {
            TokenKind::Minus => UnaryOperator::Negate,
            TokenKind::Not => UnaryOperator::Not,
            _ => return self.parse_primary(),
        };
        let operator = self.tokens.consume_token();
        let operand = self.nested(Self::parse_unary);
        let span = operator.span.to(self.ast.span(operand));
        self.push_expression(Expression::Unary { op, operand }, span, Vec::new())
    }

    fn parse_primary(&mut self) -> NodeId {
        let token = self.tokens.consume_token();
        let mut errors = Vec::new();
        let expression = match token.kind {
            TokenKind::Identifier if self.tokens.current_token().kind == TokenKind::LParen => {
                return self.parse_call(token);
            }
            TokenKind::Identifier => Expression::Identifier(token.text.to_string()),
            TokenKind::Integer => match token.text.parse::<i64>() {
                Ok(value) => Expression::Integer(value),
                Err(_) => {
                    errors.push(Diagnostic::new(ErrorKind::UnexpectedToken, token.span));
                    Expression::Integer(0)
                }
            },
            TokenKind::String => Expression::String(token.text.to_string()),
            TokenKind::True => Expression::Boolean(true),
            TokenKind::False => Expression::Boolean(false),
            TokenKind::Null => Expression::Null,
            TokenKind::LBracket => return self.parse_list_literal(token),
            TokenKind::LParen => {
                let inner = self.parse_expression();
                self.require(TokenKind::RParen, &mut errors);
                let span = self.span_from(token.span);
                return self.push_expression(Expression::Parenthesized(inner), span, errors);
            }
            _ => {
                errors.push(Diagnostic::new(ErrorKind::UnexpectedToken, token.span));
                Expression::SyntaxError(token.text.to_string())
            }
        };
        self.push_expression(expression, token.span, errors)
    }

    fn parse_list_literal(&mut self, open: Token<'a>) -> NodeId {
        let mut items = Vec::new();
        if !self.tokens.matches(&[TokenKind::RBracket]) {
            loop {
                items.push(self.parse_expression());
                if !self.tokens.match_and_consume(TokenKind::Comma) {
                    break;
                }
            }
        }
        let mut errors = Vec::new();
        if !self.tokens.match_and_consume(TokenKind::RBracket) {
            errors.push(Diagnostic::new(
                ErrorKind::UnterminatedList,
                self.tokens.current_token().span,
            ));
        }
        let span = self.span_from(open.span);
        self.push_expression(Expression::List(items), span, errors)
    }

    /// Parses `name(args)` with the cursor on the opening parenthesis.
    pub(super) fn parse_call(&mut self, name: Token<'a>) -> NodeId {
        let mut errors = Vec::new();
        let mut args = Vec::new();
        let open = self.require(TokenKind::LParen, &mut errors);
        if open.kind == TokenKind::LParen && !self.tokens.match_and_consume(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression());
                if !self.tokens.match_and_consume(TokenKind::Comma) {
                    break;
                }
            }
            if !self.tokens.match_and_consume(TokenKind::RParen) {
                errors.push(Diagnostic::new(
                    ErrorKind::UnterminatedArgList,
                    self.tokens.current_token().span,
                ));
            }
        }
        let span = self.span_from(name.span);
        self.push_expression(
            Expression::Call {
                name: name.text.to_string(),
                args,
            },
            span,
            errors,
        )
    }

    /// Parses a type annotation. Unknown names are reported and read as
    /// `object`.
    pub(super) fn parse_type_expression(&mut self, errors: &mut Vec<Diagnostic>) -> CatscriptType {
        let token = self.tokens.current_token();
        if token.kind != TokenKind::Identifier {
            errors.push(Diagnostic::new(ErrorKind::UnexpectedToken, token.span));
            return CatscriptType::Object;
        }
        self.tokens.consume_token();
        if token.text == "list" {
            if !self.tokens.match_and_consume(TokenKind::Less) {
                return CatscriptType::list_of(CatscriptType::Object);
            }
            let component = self.parse_type_expression(errors);
            self.require(TokenKind::Greater, errors);
            return CatscriptType::list_of(component);
        }
        CatscriptType::from_name(token.text).unwrap_or_else(|| {
            errors.push(Diagnostic::new(ErrorKind::UnexpectedToken, token.span));
            CatscriptType::Object
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{Ast, Expression, ProgramBody, UnaryOperator};
    use crate::diagnostic::ErrorKind;
    use crate::parser::parse_as_expression;

    fn root_expression(ast: &Ast) -> &Expression {
        let Some(ProgramBody::Expression(id)) = ast.program_body() else {
            panic!("expected expression program");
        };
        ast.expression(*id).expect("expression")
    }

    fn kinds(ast: &Ast) -> Vec<ErrorKind> {
        ast.diagnostics().iter().map(|d| d.kind).collect()
    }

    #[test]
    fn equality_is_right_associative() {
        let ast = parse_as_expression("1 == 2 == true");
        let Expression::Equality { right, .. } = root_expression(&ast) else {
            panic!("expected equality");
        };
        assert!(matches!(
            ast.expression(*right),
            Some(Expression::Equality { .. })
        ));
    }

    #[test]
    fn unary_operators_nest() {
        let ast = parse_as_expression("not !true");
        let Expression::Unary { op, operand } = root_expression(&ast) else {
            panic!("expected unary");
        };
        assert_eq!(*op, UnaryOperator::Not);
        assert!(matches!(
            ast.expression(*operand),
            Some(Expression::Unary {
                op: UnaryOperator::Not,
                ..
            })
        ));
    }

    #[test]
    fn nesting_past_the_limit_is_a_syntax_error() {
        let depth = crate::parser::MAX_NESTING + 200;
        let source = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        let ast = parse_as_expression(&source);
        assert!(matches!(root_expression(&ast), Expression::Parenthesized(_)));
        let errors = kinds(&ast);
        assert!(!errors.is_empty());
        assert!(errors.iter().all(|kind| *kind == ErrorKind::UnexpectedToken));

        let negations = parse_as_expression(&format!("{}1", "-".repeat(depth)));
        assert!(kinds(&negations).contains(&ErrorKind::UnexpectedToken));
    }

    #[test]
    fn parenthesized_expression_requires_closing_paren() {
        let ast = parse_as_expression("(1 + 2");
        assert!(matches!(root_expression(&ast), Expression::Parenthesized(_)));
        assert_eq!(kinds(&ast), vec![ErrorKind::UnexpectedToken]);
    }

    #[test]
    fn unterminated_argument_list_is_reported() {
        let ast = parse_as_expression("foo(1, 2");
        assert!(matches!(
            root_expression(&ast),
            Expression::Call { args, .. } if args.len() == 2
        ));
        assert_eq!(kinds(&ast), vec![ErrorKind::UnterminatedArgList]);
    }

    #[test]
    fn empty_argument_list_and_list_literal() {
        let ast = parse_as_expression("foo()");
        assert!(matches!(root_expression(&ast), Expression::Call { args, .. } if args.is_empty()));
        let ast = parse_as_expression("[]");
        assert!(matches!(root_expression(&ast), Expression::List(items) if items.is_empty()));
        assert!(ast.diagnostics().is_empty());
    }

    #[test]
    fn oversized_integer_literal_is_reported() {
        let ast = parse_as_expression("99999999999999999999");
        assert!(matches!(root_expression(&ast), Expression::Integer(0)));
        assert_eq!(kinds(&ast), vec![ErrorKind::UnexpectedToken]);
    }

    #[test]
    fn literals_keep_their_values() {
        let ast = parse_as_expression(r#"["cat", null, false]"#);
        let Expression::List(items) = root_expression(&ast) else {
            panic!("expected list");
        };
        let values: Vec<_> = items.iter().map(|id| ast.expression(*id)).collect();
        assert_eq!(
            values,
            vec![
                Some(&Expression::String("cat".to_string())),
                Some(&Expression::Null),
                Some(&Expression::Boolean(false)),
            ]
        );
    }
}
