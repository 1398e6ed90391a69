use serde::Serialize;

/// Per-program execution state owned by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveProgramState {
    pub program: u16,
    pub offset: u32,
    pub pending_jump: Option<u32>,
    pub stack: Vec<i32>,
    pub stack_pointer: usize,
}

impl ActiveProgramState {
    /// Fresh state positioned at `entry` with a zeroed stack.
    pub fn new(program: u16, entry: u32, stack_capacity: usize) -> Self {
        Self {
            program,
            offset: entry,
            pending_jump: None,
            stack: vec![0; stack_capacity],
            stack_pointer: 0,
        }
    }

    /// Value in the slot the stack pointer addresses.
    pub fn top(&self) -> Option<i32> {
        self.stack.get(self.stack_pointer).copied()
    }

    pub fn stack_capacity(&self) -> usize {
        self.stack.len()
    }
}
