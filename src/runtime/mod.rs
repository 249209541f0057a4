pub mod class;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod symbols;
pub mod value;


pub use interpreter::{run_source, Interpreter, ProgramError};
