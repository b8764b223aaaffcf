use crate::token::{Position, TemplatePart, Token, Tokenizer};

fn id(s: &str) -> Token {
    Token::Ident(s.to_string())
}

#[test]
fn basic() {
    let t1 = Tokenizer::tokenize(r#"1.3+*/ % ==  "str1" 'str2' true false nil "#);
    let e1 = vec![
        Token::Float(1.3),
        Token::Add,
        Token::Mul,
        Token::Div,
        Token::Mod,
        Token::Eq,
        Token::Str("str1".to_string()),
        Token::Str("str2".to_string()),
        Token::Bool(true),
        Token::Bool(false),
        Token::Nil,
        Token::Semicolon,
    ];
    assert_eq!(t1.unwrap(), e1);
}

#[test]
fn test_compound_assignment_tokens() {
    let tokens = Tokenizer::tokenize("+= -= *= /=").unwrap();
    assert_eq!(
        tokens,
        vec![Token::AddAssign, Token::SubAssign, Token::MulAssign, Token::DivAssign]
    );
}

#[test]
fn test_multi_char_operators() {
    let tokens = Tokenizer::tokenize("x := a ** 2 << 1 >> 3 <- ch").unwrap();
    assert_eq!(
        tokens,
        vec![
            id("x"),
            Token::Declare,
            id("a"),
            Token::Pow,
            Token::Int(2),
            Token::Shl,
            Token::Int(1),
            Token::Shr,
            Token::Int(3),
            Token::Arrow,
            id("ch"),
            Token::Semicolon,
        ]
    );
}

#[test]
fn test_newline_inserts_semicolon() {
    let tokens = Tokenizer::tokenize("x := 1\ny := 2\n").unwrap();
    assert_eq!(
        tokens,
        vec![
            id("x"),
            Token::Declare,
            Token::Int(1),
            Token::Semicolon,
            id("y"),
            Token::Declare,
            Token::Int(2),
            Token::Semicolon,
        ]
    );
}

#[test]
fn test_no_semicolon_inside_brackets() {
    let tokens = Tokenizer::tokenize("[1,\n2\n]").unwrap();
    assert_eq!(
        tokens,
        vec![
            Token::LBracket,
            Token::Int(1),
            Token::Comma,
            Token::Int(2),
            Token::RBracket,
            Token::Semicolon,
        ]
    );
}

#[test]
fn test_no_semicolon_after_operator() {
    let tokens = Tokenizer::tokenize("1 +\n2").unwrap();
    assert_eq!(tokens, vec![Token::Int(1), Token::Add, Token::Int(2), Token::Semicolon]);
}

#[test]
fn test_semicolon_before_closing_brace() {
    let tokens = Tokenizer::tokenize("{ x }").unwrap();
    assert_eq!(
        tokens,
        vec![Token::LBrace, id("x"), Token::Semicolon, Token::RBrace, Token::Semicolon]
    );
}

#[test]
fn test_keywords() {
    let tokens = Tokenizer::tokenize("func return if else for range break continue").unwrap();
    assert_eq!(
        tokens,
        vec![
            Token::Func,
            Token::Return,
            Token::If,
            Token::Else,
            Token::For,
            Token::Range,
            Token::Break,
            Token::Continue,
            Token::Semicolon,
        ]
    );
    let tokens = Tokenizer::tokenize("switch case default import from as go defer in not const var").unwrap();
    assert_eq!(tokens.len(), 12);
    assert_eq!(tokens[0], Token::Switch);
    assert_eq!(tokens[9], Token::NotKw);
}

#[test]
fn test_comments() {
    let src = "x // trailing\n# hash comment\n/* block\n comment */ y";
    let tokens = Tokenizer::tokenize(src).unwrap();
    assert_eq!(tokens, vec![id("x"), Token::Semicolon, id("y"), Token::Semicolon]);
}

#[test]
fn test_numbers() {
    let tokens = Tokenizer::tokenize("0xff 1_000 2.5e3 7").unwrap();
    assert_eq!(
        tokens,
        vec![
            Token::Int(255),
            Token::Int(1000),
            Token::Float(2500.0),
            Token::Int(7),
            Token::Semicolon,
        ]
    );
}

#[test]
fn test_string_escapes() {
    let tokens = Tokenizer::tokenize(r#""a\tb\n\"q\"""#).unwrap();
    assert_eq!(tokens[0], Token::Str("a\tb\n\"q\"".to_string()));
}

#[test]
fn test_unterminated_string() {
    let err = Tokenizer::tokenize("x := \"abc").unwrap_err();
    assert!(err.message.contains("unterminated string"));
    assert_eq!(err.position(), Some(Position::new(1, 6, 5)));
}

#[test]
fn test_template_parts() {
    let tokens = Tokenizer::tokenize("`hi {name}!`").unwrap();
    match &tokens[0] {
        Token::Template(parts) => {
            assert_eq!(parts.len(), 3);
            assert_eq!(parts[0], TemplatePart::Text("hi ".to_string()));
            match &parts[1] {
                TemplatePart::Expr(src, pos) => {
                    assert_eq!(src, "name");
                    assert_eq!(pos.column, 6);
                }
                other => panic!("expected expr part, got {other:?}"),
            }
            assert_eq!(parts[2], TemplatePart::Text("!".to_string()));
        }
        other => panic!("expected template, got {other:?}"),
    }
}

#[test]
fn test_spans_track_lines() {
    let (tokens, spans) = Tokenizer::tokenize_with_spans("a\n  bb").unwrap();
    assert_eq!(tokens.len(), spans.len());
    assert_eq!(spans[0].start, Position::new(1, 1, 0));
    // tokens: a ; bb ;
    assert_eq!(spans[2].start, Position::new(2, 3, 4));
    assert_eq!(spans[2].end, Position::new(2, 5, 6));
}

#[test]
fn test_unexpected_character() {
    let err = Tokenizer::tokenize("x := @").unwrap_err();
    assert!(err.message.contains("unexpected character"));
    assert_eq!(err.position().map(|p| p.column), Some(6));
}
