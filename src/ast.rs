//! Syntax tree produced by the expression parser.
//!
//! The parser understands a good part of JavaScript expression syntax so
//! that rejected constructs are reported by name; the interpreter only
//! accepts the small whitelisted subset.

/// A literal value as written in the source.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
}

impl Literal {
    /// The JavaScript `typeof`-style name of the literal.
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::String(_) => "string",
            Literal::Number(_) => "number",
            Literal::Boolean(_) => "boolean",
            Literal::Null => "null",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    In,
    InstanceOf,
}

impl BinaryOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Rem => "%",
            BinaryOperator::Exp => "**",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::StrictEq => "===",
            BinaryOperator::StrictNe => "!==",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
            BinaryOperator::UShr => ">>>",
            BinaryOperator::In => "in",
            BinaryOperator::InstanceOf => "instanceof",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        let op = match token {
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Sub,
            "*" => BinaryOperator::Mul,
            "/" => BinaryOperator::Div,
            "%" => BinaryOperator::Rem,
            "**" => BinaryOperator::Exp,
            "<" => BinaryOperator::Lt,
            "<=" => BinaryOperator::Le,
            ">" => BinaryOperator::Gt,
            ">=" => BinaryOperator::Ge,
            "==" => BinaryOperator::Eq,
            "!=" => BinaryOperator::Ne,
            "===" => BinaryOperator::StrictEq,
            "!==" => BinaryOperator::StrictNe,
            "&" => BinaryOperator::BitAnd,
            "|" => BinaryOperator::BitOr,
            "^" => BinaryOperator::BitXor,
            "<<" => BinaryOperator::Shl,
            ">>" => BinaryOperator::Shr,
            ">>>" => BinaryOperator::UShr,
            "in" => BinaryOperator::In,
            "instanceof" => BinaryOperator::InstanceOf,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
    Plus,
    Not,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

/// `a.b` (named) versus `a[b]` (computed).
#[derive(Debug, Clone, PartialEq)]
pub enum MemberProperty {
    Named(String),
    Computed(Box<Node>),
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(Literal),
    /// `` `a${b}c` ``; there is always one more quasi than expressions.
    TemplateLiteral {
        quasis: Vec<String>,
        expressions: Vec<Node>,
    },
    Identifier(String),
    This,
    Array(Vec<Node>),
    Object(Vec<(String, Node)>),
    Member {
        object: Box<Node>,
        property: MemberProperty,
    },
    Call {
        callee: Box<Node>,
        arguments: Vec<Node>,
    },
    New {
        callee: Box<Node>,
        arguments: Vec<Node>,
    },
    Unary {
        operator: UnaryOperator,
        argument: Box<Node>,
    },
    /// `++x`, `x--`
    Update {
        increment: bool,
        prefix: bool,
        argument: Box<Node>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Node>,
        right: Box<Node>,
    },
    Logical {
        operator: LogicalOperator,
        left: Box<Node>,
        right: Box<Node>,
    },
    Conditional {
        test: Box<Node>,
        consequent: Box<Node>,
        alternate: Box<Node>,
    },
    Assignment {
        operator: String,
        target: Box<Node>,
        value: Box<Node>,
    },
    Sequence(Vec<Node>),
}

impl Node {
    /// ESTree-style node type name, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Node::Literal(_) => "Literal",
            Node::TemplateLiteral { .. } => "TemplateLiteral",
            Node::Identifier(_) => "Identifier",
            Node::This => "ThisExpression",
            Node::Array(_) => "ArrayExpression",
            Node::Object(_) => "ObjectExpression",
            Node::Member { .. } => "MemberExpression",
            Node::Call { .. } => "CallExpression",
            Node::New { .. } => "NewExpression",
            Node::Unary { .. } => "UnaryExpression",
            Node::Update { .. } => "UpdateExpression",
            Node::Binary { .. } => "BinaryExpression",
            Node::Logical { .. } => "LogicalExpression",
            Node::Conditional { .. } => "ConditionalExpression",
            Node::Assignment { .. } => "AssignmentExpression",
            Node::Sequence(_) => "SequenceExpression",
        }
    }
}
