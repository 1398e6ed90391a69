//! Single-threaded stepper over one active program at a time.

use std::ops::Bound::{Excluded, Unbounded};

use log::{debug, trace, warn};
use relic_formats::{Database, Instruction, Program};
use serde::Serialize;
use thiserror::Error;

use crate::config::DEFAULT_STACK_CAPACITY;
use crate::state::ActiveProgramState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterConfig {
    pub stack_capacity: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            stack_capacity: DEFAULT_STACK_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpreterError {
    #[error("no program is active")]
    NoActiveProgram,
    #[error("program {0} is not loaded")]
    UnknownProgram(u16),
    #[error("program {0} has no instructions")]
    EmptyProgram(u16),
    #[error("program {program} has no instruction at offset {offset}")]
    UnknownOffset { program: u16, offset: u32 },
    #[error("program {program} reached the end of its script")]
    EndOfScript { program: u16 },
    #[error("stack pointer {pointer} is outside the {capacity}-slot stack")]
    StackOverflow { pointer: usize, capacity: usize },
    #[error("program did not stop within {0} steps")]
    StepLimitExceeded(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Idle,
    Running,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Moved on to the next instruction.
    Advanced { offset: u32 },
    /// `StopScript` resumed at the pending jump target.
    Returned { target: u32 },
    /// Executed as a no-op; the instruction has no behaviour yet.
    Unhandled { offset: u32, instruction: Instruction },
}

pub struct Interpreter<'db> {
    database: &'db Database,
    config: InterpreterConfig,
    status: Status,
    program: Option<&'db Program>,
    state: Option<ActiveProgramState>,
}

impl<'db> Interpreter<'db> {
    pub fn new(database: &'db Database, config: InterpreterConfig) -> Self {
        Self {
            database,
            config,
            status: Status::Idle,
            program: None,
            state: None,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn state(&self) -> Option<&ActiveProgramState> {
        self.state.as_ref()
    }

    pub fn config(&self) -> InterpreterConfig {
        self.config
    }

    /// Makes `id` the active program, positioned at its first instruction.
    ///
    /// On error the previous program (if any) stays active.
    pub fn switch_active_program(&mut self, id: u16) -> Result<(), InterpreterError> {
        let program = self
            .database
            .programs
            .get(id)
            .ok_or(InterpreterError::UnknownProgram(id))?;
        let entry = program
            .first_offset()
            .ok_or(InterpreterError::EmptyProgram(id))?;

        debug!("switching to program {id} at offset {entry}");
        self.state = Some(ActiveProgramState::new(
            id,
            entry,
            self.config.stack_capacity,
        ));
        self.program = Some(program);
        self.status = Status::Running;
        Ok(())
    }

    /// Where the next `StopScript` resumes instead of terminating.
    pub fn set_pending_jump(&mut self, target: u32) -> Result<(), InterpreterError> {
        let state = self
            .state
            .as_mut()
            .ok_or(InterpreterError::NoActiveProgram)?;
        state.pending_jump = Some(target);
        Ok(())
    }

    pub fn current_instruction(&self) -> Option<&'db Instruction> {
        let program = self.program?;
        let state = self.state.as_ref()?;
        program.instructions.get(&state.offset)
    }

    pub fn step(&mut self) -> Result<StepOutcome, InterpreterError> {
        if let Some(err) = self.inactive_error() {
            return Err(err);
        }
        let (Some(program), Some(state)) = (self.program, self.state.as_mut()) else {
            return Err(InterpreterError::NoActiveProgram);
        };

        let offset = state.offset;
        let instruction = *program
            .instructions
            .get(&offset)
            .ok_or(InterpreterError::UnknownOffset {
                program: state.program,
                offset,
            })?;
        trace!("program {} @{offset}: {instruction}", state.program);

        match instruction {
            Instruction::StopScript => match state.pending_jump.take() {
                Some(target) => {
                    state.offset = target;
                    Ok(StepOutcome::Returned { target })
                }
                None => {
                    self.status = Status::Terminated;
                    Err(InterpreterError::EndOfScript {
                        program: state.program,
                    })
                }
            },
            Instruction::Noop => self.advance(),
            Instruction::PushByte { .. }
            | Instruction::PushWord { .. }
            | Instruction::PushLong { .. } => {
                let capacity = state.stack.len();
                let pointer = state.stack_pointer;
                let slot = state
                    .stack
                    .get_mut(pointer)
                    .ok_or(InterpreterError::StackOverflow { pointer, capacity })?;
                // The pointer stays put; consecutive literals share a slot.
                *slot = instruction.literal().unwrap_or_default();
                self.advance()
            }
            other => {
                warn!(
                    "unhandled instruction {other} at offset {offset} in program {}",
                    state.program
                );
                self.advance()?;
                Ok(StepOutcome::Unhandled {
                    offset,
                    instruction: other,
                })
            }
        }
    }

    /// Steps until the script ends. Returns the number of steps taken,
    /// counting the one that ended it.
    pub fn run_until_stop(&mut self, max_steps: usize) -> Result<usize, InterpreterError> {
        if self.status == Status::Terminated {
            return Ok(0);
        }
        for taken in 1..=max_steps {
            match self.step() {
                Ok(_) => {}
                Err(InterpreterError::EndOfScript { .. }) => return Ok(taken),
                Err(err) => return Err(err),
            }
        }
        Err(InterpreterError::StepLimitExceeded(max_steps))
    }

    fn inactive_error(&self) -> Option<InterpreterError> {
        match (self.status, self.state.as_ref()) {
            (Status::Idle, _) | (_, None) => Some(InterpreterError::NoActiveProgram),
            (Status::Terminated, Some(state)) => Some(InterpreterError::EndOfScript {
                program: state.program,
            }),
            (Status::Running, Some(_)) => None,
        }
    }

    fn advance(&mut self) -> Result<StepOutcome, InterpreterError> {
        let (Some(program), Some(state)) = (self.program, self.state.as_mut()) else {
            return Err(InterpreterError::NoActiveProgram);
        };
        let next = program
            .instructions
            .range((Excluded(state.offset), Unbounded))
            .next()
            .map(|(&offset, _)| offset);
        match next {
            Some(offset) => {
                state.offset = offset;
                Ok(StepOutcome::Advanced { offset })
            }
            None => {
                self.status = Status::Terminated;
                Err(InterpreterError::EndOfScript {
                    program: state.program,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(instructions: &[(u32, Instruction)]) -> Program {
        Program {
            instructions: instructions.iter().copied().collect(),
            ..Program::default()
        }
    }

    fn database_with(programs: Vec<(u16, Program)>) -> Database {
        let mut database = Database::new();
        for (id, program) in programs {
            database.programs.insert(id, program);
        }
        database
    }

    #[test]
    fn noop_then_stop_terminates() {
        let database = database_with(vec![(
            1,
            program(&[(0, Instruction::Noop), (1, Instruction::StopScript)]),
        )]);
        let mut interpreter = Interpreter::new(&database, InterpreterConfig::default());
        interpreter.switch_active_program(1).unwrap();

        assert_eq!(interpreter.step(), Ok(StepOutcome::Advanced { offset: 1 }));
        assert_eq!(interpreter.state().unwrap().offset, 1);
        assert_eq!(interpreter.current_instruction(), Some(&Instruction::StopScript));

        assert_eq!(
            interpreter.step(),
            Err(InterpreterError::EndOfScript { program: 1 })
        );
        assert_eq!(interpreter.status(), Status::Terminated);
        assert_eq!(
            interpreter.step(),
            Err(InterpreterError::EndOfScript { program: 1 })
        );
    }

    #[test]
    fn stop_with_pending_jump_returns() {
        let database = database_with(vec![(
            2,
            program(&[
                (0, Instruction::Noop),
                (1, Instruction::StopScript),
                (2, Instruction::Noop),
                (3, Instruction::StopScript),
            ]),
        )]);
        let mut interpreter = Interpreter::new(&database, InterpreterConfig::default());
        interpreter.switch_active_program(2).unwrap();
        interpreter.set_pending_jump(2).unwrap();

        interpreter.step().unwrap();
        assert_eq!(interpreter.step(), Ok(StepOutcome::Returned { target: 2 }));
        assert_eq!(interpreter.state().unwrap().pending_jump, None);
        assert_eq!(interpreter.status(), Status::Running);

        assert_eq!(interpreter.run_until_stop(10), Ok(2));
        assert_eq!(interpreter.status(), Status::Terminated);
        assert_eq!(interpreter.run_until_stop(10), Ok(0));
    }

    #[test]
    fn idle_interpreter_has_no_program() {
        let database = Database::new();
        let mut interpreter = Interpreter::new(&database, InterpreterConfig::default());
        assert_eq!(interpreter.step(), Err(InterpreterError::NoActiveProgram));
        assert_eq!(
            interpreter.set_pending_jump(4),
            Err(InterpreterError::NoActiveProgram)
        );
        assert_eq!(interpreter.current_instruction(), None);
    }

    #[test]
    fn switching_validates_the_program() {
        let mut database = database_with(vec![
            (1, program(&[(0, Instruction::StopScript)])),
            (2, program(&[])),
        ]);
        database.programs.mark_failed(3, "truncated");
        let mut interpreter = Interpreter::new(&database, InterpreterConfig::default());

        assert_eq!(
            interpreter.switch_active_program(9),
            Err(InterpreterError::UnknownProgram(9))
        );
        assert_eq!(
            interpreter.switch_active_program(3),
            Err(InterpreterError::UnknownProgram(3))
        );
        assert_eq!(
            interpreter.switch_active_program(2),
            Err(InterpreterError::EmptyProgram(2))
        );
        assert_eq!(interpreter.status(), Status::Idle);
    }

    #[test]
    fn switching_resets_state() {
        let database = database_with(vec![
            (
                1,
                program(&[(0, Instruction::PushByte { value: 9 }), (2, Instruction::StopScript)]),
            ),
            (5, program(&[(10, Instruction::Noop), (11, Instruction::StopScript)])),
        ]);
        let mut interpreter = Interpreter::new(&database, InterpreterConfig { stack_capacity: 4 });
        interpreter.switch_active_program(1).unwrap();
        interpreter.set_pending_jump(0).unwrap();
        interpreter.step().unwrap();
        assert_eq!(interpreter.state().unwrap().stack[0], 9);

        interpreter.switch_active_program(5).unwrap();
        let state = interpreter.state().unwrap();
        assert_eq!(state.program, 5);
        assert_eq!(state.offset, 10);
        assert_eq!(state.pending_jump, None);
        assert_eq!(state.stack, vec![0; 4]);
        assert_eq!(state.stack_pointer, 0);
    }

    #[test]
    fn jump_to_a_non_instruction_offset_is_reported() {
        let database = database_with(vec![(
            1,
            program(&[(0, Instruction::StopScript), (1, Instruction::Noop)]),
        )]);
        let mut interpreter = Interpreter::new(&database, InterpreterConfig::default());
        interpreter.switch_active_program(1).unwrap();
        interpreter.set_pending_jump(7).unwrap();

        assert_eq!(interpreter.step(), Ok(StepOutcome::Returned { target: 7 }));
        assert_eq!(
            interpreter.step(),
            Err(InterpreterError::UnknownOffset { program: 1, offset: 7 })
        );
    }

    #[test]
    fn literals_overwrite_the_same_slot() {
        let database = database_with(vec![(
            1,
            program(&[
                (0, Instruction::PushByte { value: 5 }),
                (2, Instruction::PushWord { value: -300 }),
                (5, Instruction::StopScript),
            ]),
        )]);
        let mut interpreter = Interpreter::new(&database, InterpreterConfig::default());
        interpreter.switch_active_program(1).unwrap();

        interpreter.step().unwrap();
        assert_eq!(interpreter.state().unwrap().top(), Some(5));
        interpreter.step().unwrap();
        let state = interpreter.state().unwrap();
        assert_eq!(state.stack_pointer, 0);
        assert_eq!(state.stack[0], -300);
        assert_eq!(state.stack[1], 0);
    }

    #[test]
    fn zero_capacity_stack_overflows_on_fetch() {
        let database = database_with(vec![(1, program(&[(0, Instruction::PushLong { value: 1 })]))]);
        let mut interpreter = Interpreter::new(&database, InterpreterConfig { stack_capacity: 0 });
        interpreter.switch_active_program(1).unwrap();
        assert_eq!(
            interpreter.step(),
            Err(InterpreterError::StackOverflow { pointer: 0, capacity: 0 })
        );
    }

    #[test]
    fn unhandled_instructions_advance() {
        let say = Instruction::Say { character: 1, message: 2 };
        let database = database_with(vec![(
            1,
            program(&[(0, say), (4, Instruction::StopScript)]),
        )]);
        let mut interpreter = Interpreter::new(&database, InterpreterConfig::default());
        interpreter.switch_active_program(1).unwrap();
        assert_eq!(
            interpreter.step(),
            Ok(StepOutcome::Unhandled { offset: 0, instruction: say })
        );
        assert_eq!(interpreter.state().unwrap().offset, 4);
    }

    #[test]
    fn running_off_the_end_terminates() {
        let database = database_with(vec![(1, program(&[(0, Instruction::Noop)]))]);
        let mut interpreter = Interpreter::new(&database, InterpreterConfig::default());
        interpreter.switch_active_program(1).unwrap();
        assert_eq!(
            interpreter.step(),
            Err(InterpreterError::EndOfScript { program: 1 })
        );
        assert_eq!(interpreter.status(), Status::Terminated);
    }

    #[test]
    fn step_budget_is_enforced() {
        let database = database_with(vec![(1, program(&[(0, Instruction::StopScript)]))]);
        let mut interpreter = Interpreter::new(&database, InterpreterConfig::default());
        interpreter.switch_active_program(1).unwrap();
        interpreter.set_pending_jump(0).unwrap();

        assert_eq!(
            interpreter.run_until_stop(1),
            Err(InterpreterError::StepLimitExceeded(1))
        );
        assert_eq!(interpreter.run_until_stop(5), Ok(1));
    }
}
