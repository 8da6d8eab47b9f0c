//! EDL lexer: converts source text into a lazy token stream, with an
//! ifdef/ifndef directive filter sitting between the lexer and the parser.

pub mod lexer;
pub mod preprocessor;
pub mod token;

pub use lexer::Lexer;
pub use preprocessor::{Directive, Preprocessor};
pub use token::Token;
