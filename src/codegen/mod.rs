//! Bytecode generation from resolved method-body ASTs.
//!
//! The layering mirrors javac's backend:
//!
//! - `code`: the per-method byte buffer, stack accountant and size budget
//! - `chain` / `instr` / `opcodes`: jump bookkeeping and the instruction set
//! - `expr`: expression lowering (work-list based, no deep host recursion)
//! - `concat`: string concatenation strategies and indy bundle partitioning
//! - `flow`: statement lowering, switch selection, finally-block sharing
//! - `constpool`: class constant pool and BootstrapMethods construction
//! - `gen`: the per-method driver and limit enforcement
//! - `diag`: the two user-visible limit diagnostics

pub mod chain;
pub mod code;
pub mod concat;
pub mod constpool;
pub mod diag;
pub mod expr;
pub mod flow;
pub mod gen;
pub mod instr;
pub mod opcodes;

pub use code::{Code, ExceptionTableEntry, FinishedCode, Label, LineNumberEntry, SizeBudget, State};
pub use constpool::{BootstrapMethod, Constant, ConstantPool};
pub use diag::{Diagnostic, DiagnosticKind};
pub use gen::{ClassBodies, Gen, MethodCode, MethodOutcome};
pub use instr::Instr;
