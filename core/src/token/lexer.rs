use std::fmt;

use crate::token::{ParseError, Position, Span};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,       // (
    RParen,       // )
    LBrace,       // {
    RBrace,       // }
    LBracket,     // [
    RBracket,     // ]
    Dot,          // .
    Colon,        // :
    Comma,        // ,
    Semicolon,    // ; (also inserted at line ends)
    Question,     // ?
    Declare,      // :=
    Assign,       // =
    AddAssign,    // +=
    SubAssign,    // -=
    MulAssign,    // *=
    DivAssign,    // /=
    Eq,           // ==
    Ne,           // !=
    Gt,           // >
    Lt,           // <
    Ge,           // >=
    Le,           // <=
    And,          // &&
    Or,           // ||
    Not,          // !
    Add,          // +
    Sub,          // -
    Mul,          // *
    Div,          // /
    Mod,          // %
    Pow,          // **
    Shl,          // <<
    Shr,          // >>
    Amp,          // &
    Caret,        // ^
    Pipe,         // |
    Incr,         // ++
    Decr,         // --
    Arrow,        // <-
    // Keywords
    Func,
    Return,
    If,
    Else,
    For,
    Range,
    Break,
    Continue,
    Var,
    Const,
    Switch,
    Case,
    Default,
    Import,
    From,
    As,
    In,
    NotKw, // `not`, only valid before `in`
    Go,
    Defer,
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Template(Vec<TemplatePart>),
    Ident(String),
}

/// Piece of a backtick template string.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    /// Raw source of a `{...}` hole and the position of its first char.
    Expr(String, Position),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Dot => ".",
            Token::Colon => ":",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::Question => "?",
            Token::Declare => ":=",
            Token::Assign => "=",
            Token::AddAssign => "+=",
            Token::SubAssign => "-=",
            Token::MulAssign => "*=",
            Token::DivAssign => "/=",
            Token::Eq => "==",
            Token::Ne => "!=",
            Token::Gt => ">",
            Token::Lt => "<",
            Token::Ge => ">=",
            Token::Le => "<=",
            Token::And => "&&",
            Token::Or => "||",
            Token::Not => "!",
            Token::Add => "+",
            Token::Sub => "-",
            Token::Mul => "*",
            Token::Div => "/",
            Token::Mod => "%",
            Token::Pow => "**",
            Token::Shl => "<<",
            Token::Shr => ">>",
            Token::Amp => "&",
            Token::Caret => "^",
            Token::Pipe => "|",
            Token::Incr => "++",
            Token::Decr => "--",
            Token::Arrow => "<-",
            Token::Func => "func",
            Token::Return => "return",
            Token::If => "if",
            Token::Else => "else",
            Token::For => "for",
            Token::Range => "range",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::Var => "var",
            Token::Const => "const",
            Token::Switch => "switch",
            Token::Case => "case",
            Token::Default => "default",
            Token::Import => "import",
            Token::From => "from",
            Token::As => "as",
            Token::In => "in",
            Token::NotKw => "not",
            Token::Go => "go",
            Token::Defer => "defer",
            Token::Nil => "nil",
            Token::Bool(b) => return write!(f, "{b}"),
            Token::Int(i) => return write!(f, "{i}"),
            Token::Float(x) => return write!(f, "{x}"),
            Token::Str(s) => return write!(f, "{s:?}"),
            Token::Template(_) => "template string",
            Token::Ident(s) => return write!(f, "{s}"),
        };
        f.write_str(s)
    }
}

fn keyword(ident: &str) -> Option<Token> {
    let tok = match ident {
        "func" => Token::Func,
        "return" => Token::Return,
        "if" => Token::If,
        "else" => Token::Else,
        "for" => Token::For,
        "range" => Token::Range,
        "break" => Token::Break,
        "continue" => Token::Continue,
        "var" => Token::Var,
        "const" => Token::Const,
        "switch" => Token::Switch,
        "case" => Token::Case,
        "default" => Token::Default,
        "import" => Token::Import,
        "from" => Token::From,
        "as" => Token::As,
        "in" => Token::In,
        "not" => Token::NotKw,
        "go" => Token::Go,
        "defer" => Token::Defer,
        "nil" => Token::Nil,
        "true" => Token::Bool(true),
        "false" => Token::Bool(false),
        _ => return None,
    };
    Some(tok)
}

#[inline]
fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || (!c.is_ascii() && c.is_alphabetic())
}

#[inline]
fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || (!c.is_ascii() && c.is_alphanumeric())
}

/// Converts source text into tokens with aligned spans.
///
/// A newline ends a statement when the previous token could end one and no
/// `(` or `[` is open, so scripts rarely need explicit `;`.
pub struct Tokenizer {
    chars: Vec<char>,
    idx: usize,
    base: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
    spans: Vec<Span>,
    groups: Vec<char>,
}

impl Tokenizer {
    pub fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
        Self::tokenize_with_spans(src).map(|(tokens, _)| tokens)
    }

    pub fn tokenize_with_spans(src: &str) -> Result<(Vec<Token>, Vec<Span>), ParseError> {
        Self::tokenize_at(src, Position::start())
    }

    /// Tokenize a fragment that starts at `origin` in an enclosing source,
    /// used for template holes so their positions stay absolute.
    pub fn tokenize_at(src: &str, origin: Position) -> Result<(Vec<Token>, Vec<Span>), ParseError> {
        let chars: Vec<char> = src.chars().collect();
        let mut t = Tokenizer {
            tokens: Vec::with_capacity(chars.len() / 4),
            spans: Vec::with_capacity(chars.len() / 4),
            chars,
            idx: 0,
            base: origin.offset,
            line: origin.line.max(1),
            column: origin.column.max(1),
            groups: Vec::new(),
        };
        t.run()?;
        Ok((t.tokens, t.spans))
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column, self.base + self.idx)
    }

    fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError::with_position(msg, self.position())
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.idx + ahead).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.idx).copied()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.idx += 1;
        Some(c)
    }

    fn push(&mut self, tok: Token, start: Position) {
        let end = self.position();
        self.tokens.push(tok);
        self.spans.push(Span::new(start, end));
    }

    fn ends_statement(&self) -> bool {
        matches!(
            self.tokens.last(),
            Some(
                Token::Ident(_)
                    | Token::Int(_)
                    | Token::Float(_)
                    | Token::Str(_)
                    | Token::Template(_)
                    | Token::Bool(_)
                    | Token::Nil
                    | Token::RParen
                    | Token::RBracket
                    | Token::RBrace
                    | Token::Return
                    | Token::Break
                    | Token::Continue
                    | Token::Incr
                    | Token::Decr
            )
        )
    }

    fn newline(&mut self) {
        let in_group = matches!(self.groups.last(), Some('(') | Some('['));
        if !in_group && self.ends_statement() {
            let pos = self.position();
            self.tokens.push(Token::Semicolon);
            self.spans.push(Span::single(pos));
        }
    }

    fn run(&mut self) -> Result<(), ParseError> {
        while let Some(c) = self.peek() {
            if c == '\n' {
                self.newline();
                self.advance();
                continue;
            }
            if c.is_whitespace() {
                self.advance();
                continue;
            }
            if c == '#' || (c == '/' && self.peek_at(1) == Some('/')) {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
                continue;
            }
            if c == '/' && self.peek_at(1) == Some('*') {
                self.block_comment()?;
                continue;
            }
            let start = self.position();
            if c.is_ascii_digit() {
                let tok = self.number()?;
                self.push(tok, start);
            } else if is_ident_start(c) {
                let mut ident = String::new();
                while let Some(c) = self.peek() {
                    if !is_ident_continue(c) {
                        break;
                    }
                    ident.push(c);
                    self.advance();
                }
                let tok = keyword(&ident).unwrap_or(Token::Ident(ident));
                self.push(tok, start);
            } else if c == '"' || c == '\'' {
                let s = self.string(c)?;
                self.push(Token::Str(s), start);
            } else if c == '`' {
                let parts = self.template()?;
                self.push(Token::Template(parts), start);
            } else {
                let tok = self.punct()?;
                self.push(tok, start);
            }
        }
        if self.ends_statement() {
            let pos = self.position();
            self.tokens.push(Token::Semicolon);
            self.spans.push(Span::single(pos));
        }
        Ok(())
    }

    fn block_comment(&mut self) -> Result<(), ParseError> {
        let start = self.position();
        self.advance();
        self.advance();
        while let Some(c) = self.advance() {
            if c == '*' && self.peek() == Some('/') {
                self.advance();
                return Ok(());
            }
        }
        Err(ParseError::with_position("block comment not closed", start))
    }

    fn number(&mut self) -> Result<Token, ParseError> {
        let mut text = String::new();
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.advance();
            self.advance();
            while let Some(c) = self.peek() {
                if !(c.is_ascii_hexdigit() || c == '_') {
                    break;
                }
                if c != '_' {
                    text.push(c);
                }
                self.advance();
            }
            return i64::from_str_radix(&text, 16)
                .map(Token::Int)
                .map_err(|_| self.err(format!("invalid hex literal 0x{text}")));
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                if c != '_' {
                    text.push(c);
                }
                self.advance();
            } else if c == '.' && !is_float && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
                is_float = true;
                text.push(c);
                self.advance();
            } else if (c == 'e' || c == 'E')
                && (self.peek_at(1).is_some_and(|d| d.is_ascii_digit())
                    || (matches!(self.peek_at(1), Some('+') | Some('-'))
                        && self.peek_at(2).is_some_and(|d| d.is_ascii_digit())))
            {
                is_float = true;
                text.push(c);
                self.advance();
                if let Some(sign @ ('+' | '-')) = self.peek() {
                    text.push(sign);
                    self.advance();
                }
            } else {
                break;
            }
        }
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| self.err(format!("invalid float literal {text}")))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| self.err(format!("integer literal {text} out of range")))
        }
    }

    fn escape(&mut self) -> Result<char, ParseError> {
        match self.advance() {
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('t') => Ok('\t'),
            Some('0') => Ok('\0'),
            Some(c @ ('\\' | '\'' | '"' | '`' | '{' | '}')) => Ok(c),
            Some(c) => Err(self.err(format!("unknown escape sequence \\{c}"))),
            None => Err(self.err("unterminated escape sequence")),
        }
    }

    fn string(&mut self, quote: char) -> Result<String, ParseError> {
        let start = self.position();
        self.advance();
        let mut content = String::new();
        while let Some(c) = self.advance() {
            match c {
                c if c == quote => return Ok(content),
                '\\' => content.push(self.escape()?),
                '\n' => return Err(ParseError::with_position("unterminated string literal", start)),
                c => content.push(c),
            }
        }
        Err(ParseError::with_position("unterminated string literal", start))
    }

    fn template(&mut self) -> Result<Vec<TemplatePart>, ParseError> {
        let start = self.position();
        self.advance();
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            let Some(c) = self.advance() else {
                return Err(ParseError::with_position("unterminated template string", start));
            };
            match c {
                '`' => break,
                '\\' => text.push(self.escape()?),
                '{' => {
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                    }
                    let hole_start = self.position();
                    let mut depth = 1;
                    let mut src = String::new();
                    loop {
                        let Some(c) = self.advance() else {
                            return Err(ParseError::with_position("unterminated template hole", hole_start));
                        };
                        match c {
                            '{' => depth += 1,
                            '}' => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            _ => {}
                        }
                        src.push(c);
                    }
                    parts.push(TemplatePart::Expr(src, hole_start));
                }
                c => text.push(c),
            }
        }
        if !text.is_empty() || parts.is_empty() {
            parts.push(TemplatePart::Text(text));
        }
        Ok(parts)
    }

    fn punct(&mut self) -> Result<Token, ParseError> {
        let c = self.advance().ok_or_else(|| self.err("unexpected end of input"))?;
        let next = self.peek();
        let two = |t: &mut Self, tok: Token| {
            t.advance();
            tok
        };
        let tok = match (c, next) {
            ('(', _) => {
                self.groups.push('(');
                Token::LParen
            }
            ('[', _) => {
                self.groups.push('[');
                Token::LBracket
            }
            ('{', _) => {
                self.groups.push('{');
                Token::LBrace
            }
            (')', _) | (']', _) | ('}', _) => {
                if c == '}' {
                    // `}` closes a statement inside a block on the same line
                    self.newline_before_close();
                }
                self.groups.pop();
                match c {
                    ')' => Token::RParen,
                    ']' => Token::RBracket,
                    _ => Token::RBrace,
                }
            }
            (':', Some('=')) => two(self, Token::Declare),
            (':', _) => Token::Colon,
            ('=', Some('=')) => two(self, Token::Eq),
            ('=', _) => Token::Assign,
            ('!', Some('=')) => two(self, Token::Ne),
            ('!', _) => Token::Not,
            ('<', Some('=')) => two(self, Token::Le),
            ('<', Some('<')) => two(self, Token::Shl),
            ('<', Some('-')) => two(self, Token::Arrow),
            ('<', _) => Token::Lt,
            ('>', Some('=')) => two(self, Token::Ge),
            ('>', Some('>')) => two(self, Token::Shr),
            ('>', _) => Token::Gt,
            ('&', Some('&')) => two(self, Token::And),
            ('&', _) => Token::Amp,
            ('|', Some('|')) => two(self, Token::Or),
            ('|', _) => Token::Pipe,
            ('+', Some('+')) => two(self, Token::Incr),
            ('+', Some('=')) => two(self, Token::AddAssign),
            ('+', _) => Token::Add,
            ('-', Some('-')) => two(self, Token::Decr),
            ('-', Some('=')) => two(self, Token::SubAssign),
            ('-', _) => Token::Sub,
            ('*', Some('*')) => two(self, Token::Pow),
            ('*', Some('=')) => two(self, Token::MulAssign),
            ('*', _) => Token::Mul,
            ('/', Some('=')) => two(self, Token::DivAssign),
            ('/', _) => Token::Div,
            ('%', _) => Token::Mod,
            ('^', _) => Token::Caret,
            ('.', _) => Token::Dot,
            (',', _) => Token::Comma,
            (';', _) => Token::Semicolon,
            ('?', _) => Token::Question,
            (other, _) => {
                return Err(ParseError::with_position(
                    format!("unexpected character {other:?}"),
                    Position::new(self.line, self.column.saturating_sub(1), self.base + self.idx - 1),
                ));
            }
        };
        Ok(tok)
    }

    /// `{ x := 1 }` on one line: terminate the last statement before `}`.
    fn newline_before_close(&mut self) {
        if self.groups.last() == Some(&'{') && self.ends_statement() {
            if let Some(span) = self.spans.last().copied() {
                self.tokens.push(Token::Semicolon);
                self.spans.push(Span::single(span.end));
            }
        }
    }
}
