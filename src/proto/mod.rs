pub mod command;
pub mod framer;
pub mod parser;
