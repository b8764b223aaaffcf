mod error;
mod lexer;

pub use error::{ParseError, Position, Span, offset_to_position};
pub use lexer::{TemplatePart, Token, Tokenizer};

#[cfg(test)]
mod token_test;
