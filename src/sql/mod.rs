pub mod ast;

#[cfg(feature = "cli")]
pub mod parse;
