pub mod config;
pub mod interpreter;
pub mod runner;
pub mod state;

pub use config::{EngineConfig, PaletteConventions};
pub use interpreter::{Interpreter, InterpreterConfig, InterpreterError, Status, StepOutcome};
pub use runner::{trace_program, ProgramTrace, TraceStep};
pub use state::ActiveProgramState;
