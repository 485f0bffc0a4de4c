pub mod backend;
pub mod interpret;
pub mod lexer;
pub mod state;
