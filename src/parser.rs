use crate::ast::*;
use crate::error::{ParseError, Position};

/// Nesting limit used by [`parse`].
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Punctuators, longest first so that prefix matching picks the longest one.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=",
    "^=", "**", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-", "*", "/",
    "%", "&", "|", "^", "!", "~", "?", ":", "=", ".", "@", "#",
];

const ASSIGNMENT_OPERATORS: &[&str] = &[
    "=", "+=", "-=", "*=", "/=", "%=", "**=", "<<=", ">>=", ">>>=", "&=", "|=", "^=", "&&=",
    "||=", "??=",
];

/// Words that can never be an identifier in expression position.
const RESERVED_WORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "do", "else",
    "export", "extends", "finally", "for", "function", "if", "import", "let", "return", "super",
    "switch", "throw", "try", "var", "while", "with", "yield", "in", "instanceof",
];

/// Parser state: tracks position in the input string.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

/// Either kind of infix operator handled by precedence climbing.
#[derive(Clone, Copy)]
enum Infix {
    Binary(BinaryOperator),
    Logical(LogicalOperator),
}

/// Parse a single expression.
pub fn parse(input: &str) -> Result<Node, ParseError> {
    parse_with_depth(input, DEFAULT_MAX_DEPTH)
}

/// Parse a single expression, refusing syntax nested deeper than `max_depth`.
///
/// A trailing `;` is tolerated; anything after it is an error, so a source
/// can never hold more than one statement.
pub fn parse_with_depth(input: &str, max_depth: usize) -> Result<Node, ParseError> {
    let mut parser = Parser {
        input,
        pos: 0,
        depth: 0,
        max_depth,
    };

    parser.skip_ws();
    if parser.at_end() {
        return Err(parser.unexpected());
    }
    let node = parser.parse_expression()?;
    parser.eat_punct(";");
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.unexpected());
    }
    Ok(node)
}

impl<'a> Parser<'a> {
    // ── Helpers ──────────────────────────────────────────────────────

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.remaining().chars().nth(1)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    fn starts_with(&self, s: &str) -> bool {
        self.remaining().starts_with(s)
    }

    /// Current position in the source.
    fn position(&self) -> Position {
        let consumed = &self.input[..self.pos];
        let line = consumed.matches('\n').count();
        let last_newline = consumed.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = consumed[last_newline..].chars().count();
        Position {
            line,
            column,
            offset: self.pos,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.position())
    }

    /// Describe whatever token sits at the current position.
    fn unexpected(&mut self) -> ParseError {
        self.skip_ws();
        let Some(ch) = self.peek_char() else {
            return self.error("Unexpected end of input");
        };
        if let Some(word) = self.peek_word() {
            return if RESERVED_WORDS.contains(&word) {
                self.error(format!("Unexpected token {}", word))
            } else {
                self.error("Unexpected identifier")
            };
        }
        if self.at_number() {
            return self.error("Unexpected number");
        }
        match ch {
            '"' | '\'' => self.error("Unexpected string"),
            '`' => self.error("Unexpected template string"),
            _ => match self.peek_punct() {
                Some(p) => self.error(format!("Unexpected token {}", p)),
                None => self.error("Invalid or unexpected token"),
            },
        }
    }

    /// Run `f` one nesting level deeper, enforcing the depth limit.
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= self.max_depth {
            return Err(self.error(format!(
                "Expression nested deeper than {} levels",
                self.max_depth
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Left-leaning chains (`a+b+c`, `f()()`) are built iteratively but
    /// still deepen the tree, so they count against the depth limit.
    fn check_chain(&self, chain: usize) -> Result<(), ParseError> {
        if self.depth + chain > self.max_depth {
            Err(self.error(format!(
                "Expression nested deeper than {} levels",
                self.max_depth
            )))
        } else {
            Ok(())
        }
    }

    // ── Whitespace & Comments ───────────────────────────────────────

    fn skip_ws(&mut self) {
        loop {
            while let Some(ch) = self.peek_char() {
                if ch.is_whitespace() || ch == '\u{feff}' {
                    self.advance(ch.len_utf8());
                } else {
                    break;
                }
            }
            if self.starts_with("//") {
                while let Some(ch) = self.peek_char() {
                    if ch == '\n' || ch == '\r' {
                        break;
                    }
                    self.advance(ch.len_utf8());
                }
            } else if self.starts_with("/*") {
                match self.remaining()[2..].find("*/") {
                    Some(end) => self.advance(end + 4),
                    // An unterminated comment is reported as an unexpected token.
                    None => break,
                }
            } else {
                break;
            }
        }
    }

    // ── Tokens ──────────────────────────────────────────────────────

    fn peek_punct(&self) -> Option<&'static str> {
        let rest = self.remaining();
        if rest.starts_with('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            return None;
        }
        PUNCTUATORS.iter().copied().find(|p| rest.starts_with(p))
    }

    /// Consume `punct` if it is the (longest) punctuator at the current position.
    fn eat_punct(&mut self, punct: &str) -> bool {
        self.skip_ws();
        if self.peek_punct() == Some(punct) {
            self.advance(punct.len());
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), ParseError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn peek_word(&self) -> Option<&'a str> {
        let rest = self.remaining();
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, ch)) if is_ident_start(ch) => {}
            _ => return None,
        }
        let end = chars
            .find(|&(_, ch)| !is_ident_part(ch))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        Some(&rest[..end])
    }

    fn eat_word(&mut self, word: &str) -> bool {
        self.skip_ws();
        if self.peek_word() == Some(word) {
            self.advance(word.len());
            true
        } else {
            false
        }
    }

    fn at_number(&self) -> bool {
        match self.peek_char() {
            Some(ch) if ch.is_ascii_digit() => true,
            Some('.') => self.peek_second().is_some_and(|c| c.is_ascii_digit()),
            _ => false,
        }
    }

    // ── Expressions ─────────────────────────────────────────────────

    /// `a, b, c`
    fn parse_expression(&mut self) -> Result<Node, ParseError> {
        let first = self.parse_assignment()?;
        if !self.eat_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        loop {
            items.push(self.parse_assignment()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Node::Sequence(items))
    }

    fn parse_assignment(&mut self) -> Result<Node, ParseError> {
        self.nested(|p| {
            let target = p.parse_conditional()?;
            p.skip_ws();
            match p.peek_punct() {
                Some(op) if ASSIGNMENT_OPERATORS.contains(&op) => {
                    p.advance(op.len());
                    let value = p.parse_assignment()?;
                    Ok(Node::Assignment {
                        operator: op.to_string(),
                        target: Box::new(target),
                        value: Box::new(value),
                    })
                }
                _ => Ok(target),
            }
        })
    }

    fn parse_conditional(&mut self) -> Result<Node, ParseError> {
        let test = self.parse_binary(0)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.parse_assignment()?;
        self.expect_punct(":")?;
        let alternate = self.parse_assignment()?;
        Ok(Node::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    /// Look at the next infix operator: returns it, its precedence and
    /// its length in the source.
    fn peek_infix(&mut self) -> Option<(Infix, u8, usize)> {
        self.skip_ws();
        if let Some(word) = self.peek_word() {
            let op = BinaryOperator::from_token(word)?;
            return Some((Infix::Binary(op), 9, word.len()));
        }
        let punct = self.peek_punct()?;
        let (infix, prec) = match punct {
            "??" => (Infix::Logical(LogicalOperator::Coalesce), 3),
            "||" => (Infix::Logical(LogicalOperator::Or), 3),
            "&&" => (Infix::Logical(LogicalOperator::And), 4),
            _ => {
                let op = BinaryOperator::from_token(punct)?;
                (Infix::Binary(op), binary_precedence(op))
            }
        };
        Some((infix, prec, punct.len()))
    }

    /// Precedence climbing over binary and logical operators.
    fn parse_binary(&mut self, min_prec: u8) -> Result<Node, ParseError> {
        let mut left = self.parse_unary()?;
        let mut chain = 0;
        while let Some((infix, prec, len)) = self.peek_infix() {
            if prec < min_prec {
                break;
            }
            chain += 1;
            self.check_chain(chain)?;
            self.advance(len);
            let right_assoc = matches!(infix, Infix::Binary(BinaryOperator::Exp));
            let next_min = if right_assoc { prec } else { prec + 1 };
            let right = self.nested(|p| p.parse_binary(next_min))?;
            left = match infix {
                Infix::Binary(operator) => Node::Binary {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Infix::Logical(operator) => Node::Logical {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node, ParseError> {
        self.skip_ws();
        let operator = match self.peek_punct() {
            Some("!") => Some(UnaryOperator::Not),
            Some("~") => Some(UnaryOperator::BitNot),
            Some("+") => Some(UnaryOperator::Plus),
            Some("-") => Some(UnaryOperator::Neg),
            Some(op @ ("++" | "--")) => {
                self.advance(2);
                let argument = self.nested(|p| p.parse_unary())?;
                return Ok(Node::Update {
                    increment: op == "++",
                    prefix: true,
                    argument: Box::new(argument),
                });
            }
            _ => None,
        };
        if let Some(operator) = operator {
            self.advance(1);
            let argument = self.nested(|p| p.parse_unary())?;
            return Ok(Node::Unary {
                operator,
                argument: Box::new(argument),
            });
        }
        for (word, operator) in [
            ("typeof", UnaryOperator::TypeOf),
            ("void", UnaryOperator::Void),
            ("delete", UnaryOperator::Delete),
        ] {
            if self.eat_word(word) {
                let argument = self.nested(|p| p.parse_unary())?;
                return Ok(Node::Unary {
                    operator,
                    argument: Box::new(argument),
                });
            }
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Node, ParseError> {
        let expr = self.parse_call_member()?;
        for (punct, increment) in [("++", true), ("--", false)] {
            if self.eat_punct(punct) {
                return Ok(Node::Update {
                    increment,
                    prefix: false,
                    argument: Box::new(expr),
                });
            }
        }
        Ok(expr)
    }

    fn parse_call_member(&mut self) -> Result<Node, ParseError> {
        let mut expr = if self.eat_word("new") {
            let callee = self.nested(|p| p.parse_member_chain())?;
            let arguments = if self.eat_punct("(") {
                self.parse_arguments()?
            } else {
                Vec::new()
            };
            Node::New {
                callee: Box::new(callee),
                arguments,
            }
        } else {
            self.parse_primary()?
        };

        let mut chain = 0;
        loop {
            if let Some(property) = self.parse_member_property()? {
                expr = Node::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.eat_punct("(") {
                let arguments = self.parse_arguments()?;
                expr = Node::Call {
                    callee: Box::new(expr),
                    arguments,
                };
            } else {
                return Ok(expr);
            }
            chain += 1;
            self.check_chain(chain)?;
        }
    }

    /// A primary expression followed by `.name` / `[expr]` accesses only
    /// (the callee of `new`).
    fn parse_member_chain(&mut self) -> Result<Node, ParseError> {
        let mut expr = self.parse_primary()?;
        let mut chain = 0;
        while let Some(property) = self.parse_member_property()? {
            expr = Node::Member {
                object: Box::new(expr),
                property,
            };
            chain += 1;
            self.check_chain(chain)?;
        }
        Ok(expr)
    }

    /// Parse one `.name` or `[expr]` suffix, if present.
    fn parse_member_property(&mut self) -> Result<Option<MemberProperty>, ParseError> {
        if self.eat_punct(".") {
            self.skip_ws();
            match self.peek_word() {
                Some(name) => {
                    self.advance(name.len());
                    Ok(Some(MemberProperty::Named(name.to_string())))
                }
                None => Err(self.unexpected()),
            }
        } else if self.eat_punct("[") {
            let index = self.nested(|p| p.parse_expression())?;
            self.expect_punct("]")?;
            Ok(Some(MemberProperty::Computed(Box::new(index))))
        } else {
            Ok(None)
        }
    }

    /// Arguments after an opening `(`, through the closing `)`.
    fn parse_arguments(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut arguments = Vec::new();
        if self.eat_punct(")") {
            return Ok(arguments);
        }
        loop {
            arguments.push(self.parse_assignment()?);
            if self.eat_punct(",") {
                if self.eat_punct(")") {
                    break;
                }
            } else {
                self.expect_punct(")")?;
                break;
            }
        }
        Ok(arguments)
    }

    fn parse_primary(&mut self) -> Result<Node, ParseError> {
        self.skip_ws();
        if self.at_number() {
            return self.parse_number();
        }
        match self.peek_char() {
            None => Err(self.unexpected()),
            Some('"') | Some('\'') => self.parse_string().map(|s| Node::Literal(Literal::String(s))),
            Some('`') => self.parse_template(),
            Some('(') => {
                self.advance(1);
                let inner = self.nested(|p| p.parse_expression())?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            Some('[') => {
                self.advance(1);
                self.nested(|p| p.parse_array())
            }
            Some('{') => {
                self.advance(1);
                self.nested(|p| p.parse_object())
            }
            Some(_) => match self.peek_word() {
                Some(word) => {
                    let node = match word {
                        "true" => Node::Literal(Literal::Boolean(true)),
                        "false" => Node::Literal(Literal::Boolean(false)),
                        "null" => Node::Literal(Literal::Null),
                        "this" => Node::This,
                        w if RESERVED_WORDS.contains(&w) => return Err(self.unexpected()),
                        w => Node::Identifier(w.to_string()),
                    };
                    self.advance(word.len());
                    Ok(node)
                }
                None => Err(self.unexpected()),
            },
        }
    }

    /// Elements after an opening `[`.
    fn parse_array(&mut self) -> Result<Node, ParseError> {
        let mut elements = Vec::new();
        loop {
            if self.eat_punct("]") {
                break;
            }
            elements.push(self.parse_assignment()?);
            if !self.eat_punct(",") {
                self.expect_punct("]")?;
                break;
            }
        }
        Ok(Node::Array(elements))
    }

    /// Properties after an opening `{`.
    fn parse_object(&mut self) -> Result<Node, ParseError> {
        let mut properties = Vec::new();
        loop {
            if self.eat_punct("}") {
                break;
            }
            self.skip_ws();
            let key = if let Some(word) = self.peek_word() {
                self.advance(word.len());
                word.to_string()
            } else if matches!(self.peek_char(), Some('"') | Some('\'')) {
                self.parse_string()?
            } else if self.at_number() {
                match self.parse_number()? {
                    Node::Literal(Literal::Number(n)) => crate::value::format_number(n),
                    _ => return Err(self.unexpected()),
                }
            } else {
                return Err(self.unexpected());
            };
            let value = if self.eat_punct(":") {
                self.parse_assignment()?
            } else {
                Node::Identifier(key.clone())
            };
            properties.push((key, value));
            if !self.eat_punct(",") {
                self.expect_punct("}")?;
                break;
            }
        }
        Ok(Node::Object(properties))
    }

    // ── Literals ────────────────────────────────────────────────────

    fn parse_number(&mut self) -> Result<Node, ParseError> {
        let start = self.pos;
        let radix = match (self.peek_char(), self.peek_second()) {
            (Some('0'), Some('x' | 'X')) => 16,
            (Some('0'), Some('o' | 'O')) => 8,
            (Some('0'), Some('b' | 'B')) => 2,
            _ => 10,
        };

        let value = if radix != 10 {
            self.advance(2);
            let digits_start = self.pos;
            let mut value = 0f64;
            while let Some(d) = self.peek_char().and_then(|c| c.to_digit(radix)) {
                value = value * f64::from(radix) + f64::from(d);
                self.advance(1);
            }
            if self.pos == digits_start {
                return Err(self.error("Invalid or unexpected token"));
            }
            value
        } else {
            self.consume_decimal_digits();
            if self.peek_char() == Some('.') {
                self.advance(1);
                self.consume_decimal_digits();
            }
            if matches!(self.peek_char(), Some('e' | 'E')) {
                self.advance(1);
                if matches!(self.peek_char(), Some('+' | '-')) {
                    self.advance(1);
                }
                if !self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                    return Err(self.error("Invalid or unexpected token"));
                }
                self.consume_decimal_digits();
            }
            let text = &self.input[start..self.pos];
            text.parse::<f64>()
                .map_err(|_| ParseError::new("Invalid or unexpected token", self.position()))?
        };

        // `3in` or `1x` is not a number followed by something else.
        if self.peek_char().is_some_and(|c| is_ident_start(c) || c.is_ascii_digit()) {
            return Err(self.error("Invalid or unexpected token"));
        }
        Ok(Node::Literal(Literal::Number(value)))
    }

    fn consume_decimal_digits(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance(1);
        }
    }

    /// A single- or double-quoted string, with escapes processed.
    fn parse_string(&mut self) -> Result<String, ParseError> {
        let quote = match self.peek_char() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.unexpected()),
        };
        self.advance(1);
        let mut result = String::new();
        loop {
            match self.peek_char() {
                None | Some('\n') | Some('\r') => {
                    return Err(self.error("Invalid or unexpected token"));
                }
                Some(ch) if ch == quote => {
                    self.advance(1);
                    return Ok(result);
                }
                Some('\\') => {
                    self.advance(1);
                    if let Some(ch) = self.parse_escape()? {
                        result.push(ch);
                    }
                }
                Some(ch) => {
                    result.push(ch);
                    self.advance(ch.len_utf8());
                }
            }
        }
    }

    /// `` `text ${expr} text` ``
    fn parse_template(&mut self) -> Result<Node, ParseError> {
        self.advance(1);
        let mut quasis = Vec::new();
        let mut expressions = Vec::new();
        let mut current = String::new();
        loop {
            match self.peek_char() {
                None => return Err(self.error("Unterminated template")),
                Some('`') => {
                    self.advance(1);
                    quasis.push(current);
                    return Ok(Node::TemplateLiteral {
                        quasis,
                        expressions,
                    });
                }
                Some('\\') => {
                    self.advance(1);
                    if let Some(ch) = self.parse_escape()? {
                        current.push(ch);
                    }
                }
                Some('$') if self.starts_with("${") => {
                    self.advance(2);
                    quasis.push(std::mem::take(&mut current));
                    let expr = self.nested(|p| p.parse_expression())?;
                    self.expect_punct("}")?;
                    expressions.push(expr);
                }
                Some(ch) => {
                    current.push(ch);
                    self.advance(ch.len_utf8());
                }
            }
        }
    }

    /// Parse the character(s) after a backslash. Line continuations yield `None`.
    fn parse_escape(&mut self) -> Result<Option<char>, ParseError> {
        let Some(ch) = self.peek_char() else {
            return Err(self.error("Invalid or unexpected token"));
        };
        self.advance(ch.len_utf8());
        let escaped = match ch {
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'b' => '\u{0008}',
            'f' => '\u{000C}',
            'v' => '\u{000B}',
            '0' if !self.peek_char().is_some_and(|c| c.is_ascii_digit()) => '\0',
            'x' => self.parse_hex_escape(2)?,
            'u' => {
                if self.peek_char() == Some('{') {
                    self.advance(1);
                    let end = self
                        .remaining()
                        .find('}')
                        .ok_or_else(|| self.error("Invalid Unicode escape sequence"))?;
                    let hex = &self.remaining()[..end];
                    let ch = u32::from_str_radix(hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| self.error("Invalid Unicode escape sequence"))?;
                    self.advance(end + 1);
                    ch
                } else {
                    self.parse_hex_escape(4)?
                }
            }
            '\r' => {
                if self.peek_char() == Some('\n') {
                    self.advance(1);
                }
                return Ok(None);
            }
            '\n' | '\u{2028}' | '\u{2029}' => return Ok(None),
            other => other,
        };
        Ok(Some(escaped))
    }

    fn parse_hex_escape(&mut self, len: usize) -> Result<char, ParseError> {
        let hex = self.remaining().get(..len).unwrap_or("");
        let ch = if hex.len() == len && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else {
            None
        };
        match ch {
            Some(ch) => {
                self.advance(len);
                Ok(ch)
            }
            None => Err(self.error("Invalid hexadecimal escape sequence")),
        }
    }
}

fn binary_precedence(op: BinaryOperator) -> u8 {
    match op {
        BinaryOperator::BitOr => 5,
        BinaryOperator::BitXor => 6,
        BinaryOperator::BitAnd => 7,
        BinaryOperator::Eq | BinaryOperator::Ne | BinaryOperator::StrictEq | BinaryOperator::StrictNe => 8,
        BinaryOperator::Lt
        | BinaryOperator::Le
        | BinaryOperator::Gt
        | BinaryOperator::Ge
        | BinaryOperator::In
        | BinaryOperator::InstanceOf => 9,
        BinaryOperator::Shl | BinaryOperator::Shr | BinaryOperator::UShr => 10,
        BinaryOperator::Add | BinaryOperator::Sub => 11,
        BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Rem => 12,
        BinaryOperator::Exp => 13,
    }
}

fn is_ident_start(ch: char) -> bool {
    ch == '$' || ch == '_' || ch.is_alphabetic()
}

fn is_ident_part(ch: char) -> bool {
    is_ident_start(ch) || ch.is_alphanumeric() || ch == '\u{200c}' || ch == '\u{200d}'
}
