//! Abstract syntax tree, visitors, and printers.

pub mod ast;
pub mod printer;
pub mod visitor;
