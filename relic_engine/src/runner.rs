use std::fmt;

use relic_formats::{Database, Instruction};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::interpreter::{Interpreter, InterpreterError, StepOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceStep {
    pub offset: u32,
    pub instruction: Option<Instruction>,
    /// `None` for the step that ended the script.
    pub outcome: Option<StepOutcome>,
}

impl fmt::Display for TraceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instruction = match &self.instruction {
            Some(instruction) => instruction.to_string(),
            None => String::from("<none>"),
        };
        write!(f, "{:06x}  {instruction:<36} ", self.offset)?;
        match self.outcome {
            Some(StepOutcome::Advanced { offset }) => write!(f, "-> {offset:06x}"),
            Some(StepOutcome::Returned { target }) => write!(f, "return {target:06x}"),
            Some(StepOutcome::Unhandled { .. }) => f.write_str("unhandled"),
            None => f.write_str("end"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramTrace {
    pub program: u16,
    pub steps: Vec<TraceStep>,
}

impl ProgramTrace {
    pub fn unhandled(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step.outcome, Some(StepOutcome::Unhandled { .. })))
            .count()
    }
}

/// Runs `program` from its first instruction until it stops, recording
/// every step.
pub fn trace_program(
    database: &Database,
    program: u16,
    config: &EngineConfig,
) -> Result<ProgramTrace, InterpreterError> {
    let mut interpreter = Interpreter::new(database, config.interpreter());
    interpreter.switch_active_program(program)?;

    let mut steps = Vec::new();
    for _ in 0..config.max_steps {
        let offset = interpreter.state().map(|state| state.offset).unwrap_or_default();
        let instruction = interpreter.current_instruction().copied();
        match interpreter.step() {
            Ok(outcome) => steps.push(TraceStep {
                offset,
                instruction,
                outcome: Some(outcome),
            }),
            Err(InterpreterError::EndOfScript { .. }) => {
                steps.push(TraceStep {
                    offset,
                    instruction,
                    outcome: None,
                });
                return Ok(ProgramTrace { program, steps });
            }
            Err(err) => return Err(err),
        }
    }
    Err(InterpreterError::StepLimitExceeded(config.max_steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relic_formats::Program;

    fn database() -> Database {
        let mut program = Program::default();
        program.instructions.insert(0, Instruction::PushByte { value: 1 });
        program.instructions.insert(2, Instruction::PlaySound { sound: 4 });
        program.instructions.insert(5, Instruction::StopScript);
        let mut database = Database::new();
        database.programs.insert(3, program);
        database
    }

    #[test]
    fn trace_records_each_step_and_the_end() {
        let trace = trace_program(&database(), 3, &EngineConfig::default()).unwrap();
        let offsets: Vec<u32> = trace.steps.iter().map(|step| step.offset).collect();
        assert_eq!(offsets, vec![0, 2, 5]);
        assert_eq!(trace.unhandled(), 1);
        assert_eq!(trace.steps[2].outcome, None);
        assert!(trace.steps[1].to_string().ends_with("unhandled"));
        assert!(trace.steps[2].to_string().starts_with("000005  StopScript"));
    }

    #[test]
    fn budget_comes_from_config() {
        let config = EngineConfig {
            max_steps: 2,
            ..EngineConfig::default()
        };
        assert_eq!(
            trace_program(&database(), 3, &config),
            Err(InterpreterError::StepLimitExceeded(2))
        );
        assert_eq!(
            trace_program(&database(), 8, &config),
            Err(InterpreterError::UnknownProgram(8))
        );
    }

    #[test]
    fn trace_serializes_with_tagged_outcomes() {
        let trace = trace_program(&database(), 3, &EngineConfig::default()).unwrap();
        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json["steps"][0]["outcome"]["outcome"], "advanced");
        assert_eq!(json["steps"][1]["instruction"]["op"], "PlaySound");
        assert!(json["steps"][2]["outcome"].is_null());
    }
}
