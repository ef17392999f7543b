use thiserror::Error;

/// Result type for bcgen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Internal error types for the method-body generator.
///
/// These are lowering defects, never user diagnostics: a limit breach in the
/// source program is reported through `codegen::diag::Diagnostic` instead and
/// recovered at the method boundary. Anything surfacing here aborts the whole
/// compilation run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("operand stack underflow: pop {wanted} with depth {depth} at pc {pc}")]
    StackUnderflow { wanted: u32, depth: u32, pc: usize },

    #[error("unresolved label {label} at method finish")]
    UnresolvedLabel { label: u32 },

    #[error("label {label} bound twice")]
    LabelRebound { label: u32 },

    #[error("jump offset {offset} exceeds 16-bit encoding at pc {pc}")]
    OffsetOverflow { offset: i32, pc: usize },

    #[error("constant pool overflow: {entries} entries")]
    PoolOverflow { entries: usize },

    #[error("invalid method descriptor: {descriptor}")]
    BadDescriptor { descriptor: String },

    #[error("local slot {slot} outside frame of {max_locals} slots")]
    BadLocalSlot { slot: u32, max_locals: u32 },

    #[error("internal compiler error: {message}")]
    Internal { message: String },
}

impl Error {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}
