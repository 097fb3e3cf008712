use crate::diagnostic::{Diagnostic, ErrorKind};
use crate::token::Span;
use crate::types::CatscriptType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualityOperator {
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Identifier(String),
    Integer(i64),
    String(String),
    Boolean(bool),
    Null,
    List(Vec<NodeId>),
    Parenthesized(NodeId),
    Unary {
        op: UnaryOperator,
        operand: NodeId,
    },
    Binary {
        op: BinaryOperator,
        left: NodeId,
        right: NodeId,
    },
    Comparison {
        op: ComparisonOperator,
        left: NodeId,
        right: NodeId,
    },
    Equality {
        op: EqualityOperator,
        left: NodeId,
        right: NodeId,
    },
    Call {
        name: String,
        args: Vec<NodeId>,
    },
    /// Placeholder for a token that starts no expression; holds its text.
    SyntaxError(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: CatscriptType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: CatscriptType,
    pub body: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Variable {
        name: String,
        explicit_type: Option<CatscriptType>,
        value: NodeId,
    },
    Assignment {
        name: String,
        value: NodeId,
    },
    Function(FunctionDefinition),
    If {
        condition: NodeId,
        then_body: Vec<NodeId>,
        /// `else if` is stored as an else body holding a single `If`.
        else_body: Option<Vec<NodeId>>,
    },
    For {
        variable: String,
        iterable: NodeId,
        body: Vec<NodeId>,
    },
    Print(NodeId),
    /// A call expression used as a statement.
    Call(NodeId),
    Return(Option<NodeId>),
    SyntaxError(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgramBody {
    Expression(NodeId),
    Statements(Vec<NodeId>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Program(ProgramBody),
    Expression(Expression),
    Statement(Statement),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub parent: Option<NodeId>,
    pub errors: Vec<Diagnostic>,
    ty: Option<CatscriptType>,
}

/// Arena holding every node of one parsed program.
///
/// Nodes refer to their children by `NodeId`; the arena records the reverse
/// link when a parent is pushed, so every node has at most one parent.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len());
        for child in children_of(&kind) {
            let node = &mut self.nodes[child.0];
            assert!(node.parent.is_none(), "node {child:?} attached twice");
            node.parent = Some(id);
        }
        self.nodes.push(Node {
            kind,
            span,
            parent: None,
            errors: Vec::new(),
            ty: None,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.0].span
    }

    pub fn expression(&self, id: NodeId) -> Option<&Expression> {
        match &self.nodes[id.0].kind {
            NodeKind::Expression(expression) => Some(expression),
            _ => None,
        }
    }

    pub fn statement(&self, id: NodeId) -> Option<&Statement> {
        match &self.nodes[id.0].kind {
            NodeKind::Statement(statement) => Some(statement),
            _ => None,
        }
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    pub fn program_body(&self) -> Option<&ProgramBody> {
        match self.root.map(|root| self.kind(root)) {
            Some(NodeKind::Program(body)) => Some(body),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drops every node pushed after the arena had `len` nodes.
    pub fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
        if self.root.is_some_and(|root| root.0 >= len) {
            self.root = None;
        }
    }

    /// Resolved type of a node.
    ///
    /// # Panics
    ///
    /// Panics if the validator has not typed this node.
    pub fn ty(&self, id: NodeId) -> &CatscriptType {
        match &self.nodes[id.0].ty {
            Some(ty) => ty,
            None => panic!("type of node {id:?} read before validation"),
        }
    }

    pub fn try_ty(&self, id: NodeId) -> Option<&CatscriptType> {
        self.nodes[id.0].ty.as_ref()
    }

    pub fn set_ty(&mut self, id: NodeId, ty: CatscriptType) {
        let slot = &mut self.nodes[id.0].ty;
        assert!(slot.is_none(), "type of node {id:?} set twice");
        *slot = Some(ty);
    }

    pub fn add_error(&mut self, id: NodeId, kind: ErrorKind) {
        let span = self.span(id);
        self.add_error_at(id, kind, span);
    }

    pub fn add_error_at(&mut self, id: NodeId, kind: ErrorKind, span: Span) {
        self.nodes[id.0].errors.push(Diagnostic::new(kind, span));
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Whether the node is a direct child of the program root.
    pub fn is_top_level(&self, id: NodeId) -> bool {
        self.parent(id)
            .is_some_and(|parent| matches!(self.kind(parent), NodeKind::Program(_)))
    }

    /// Nearest function definition containing `id`, if any.
    pub fn enclosing_function(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.parent(id);
        while let Some(node) = current {
            if matches!(self.statement(node), Some(Statement::Function(_))) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        children_of(self.kind(id))
    }

    /// Every diagnostic in the tree, in source order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let Some(root) = self.root else {
            return diagnostics;
        };
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            diagnostics.extend(self.nodes[id.0].errors.iter().cloned());
            pending.extend(self.children(id).into_iter().rev());
        }
        diagnostics.sort_by_key(|diagnostic| diagnostic.span.start);
        diagnostics
    }
}

fn children_of(kind: &NodeKind) -> Vec<NodeId> {
    match kind {
        NodeKind::Program(ProgramBody::Expression(expression)) => vec![*expression],
        NodeKind::Program(ProgramBody::Statements(statements)) => statements.clone(),
        NodeKind::Expression(expression) => match expression {
            Expression::Identifier(_)
            | Expression::Integer(_)
            | Expression::String(_)
            | Expression::Boolean(_)
            | Expression::Null
            | Expression::SyntaxError(_) => Vec::new(),
            Expression::List(values) => values.clone(),
            Expression::Parenthesized(inner) => vec![*inner],
            Expression::Unary { operand, .. } => vec![*operand],
            Expression::Binary { left, right, .. }
            | Expression::Comparison { left, right, .. }
            | Expression::Equality { left, right, .. } => vec![*left, *right],
            Expression::Call { args, .. } => args.clone(),
        },
        NodeKind::Statement(statement) => match statement {
            Statement::Variable { value, .. } | Statement::Assignment { value, .. } => {
                vec![*value]
            }
            Statement::Function(function) => function.body.clone(),
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                let mut children = vec![*condition];
                children.extend(then_body);
                if let Some(else_body) = else_body {
                    children.extend(else_body);
                }
                children
            }
            Statement::For { iterable, body, .. } => {
                let mut children = vec![*iterable];
                children.extend(body);
                children
            }
            Statement::Print(value) | Statement::Call(value) => vec![*value],
            Statement::Return(value) => value.iter().copied().collect(),
            Statement::SyntaxError(_) => Vec::new(),
        },
    }
}
