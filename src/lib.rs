//! bcgen - JVM method-body bytecode generator
//!
//! The backend stage of a Java compiler that turns one resolved method or
//! initializer body into class-file bytecode. The front end (parsing,
//! attribution, flow analysis) and the class-file writer sit on either side
//! of this crate and are not part of it.
//!
//! ## Architecture
//!
//! - **ast**: resolved statement/expression trees, the input contract
//! - **codegen**: lowering to bytecode, limit enforcement, diagnostics
//!
//! ## Flow
//!
//! ```text
//! resolved AST -> Gen -> {expr, flow, concat} -> Code -> MethodCode + diagnostics
//! ```
//!
//! Every method gets a fresh buffer, stack accountant and 64KB budget; a
//! method that cannot fit reports `CodeSizeExceeded`/`StackDepthExceeded`
//! and its siblings keep compiling. Deeply nested expression trees lower
//! through explicit work lists, so pathological source nesting cannot
//! overflow the compiler's own stack.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod consts;
pub mod error;

pub use codegen::{ClassBodies, Diagnostic, DiagnosticKind, Gen, MethodCode, MethodOutcome};
pub use config::{Config, TargetRelease};
pub use error::{Error, Result};

/// Lower a set of method bodies against a shared constant pool.
///
/// Convenience entry point wrapping `Gen`: one call per class, outcomes
/// recovered per method.
pub fn generate(
    config: &Config,
    pool: &mut codegen::ConstantPool,
    bodies: &[ast::MethodBody],
) -> Result<ClassBodies> {
    let mut gen = Gen::new(config, pool);
    gen.generate_class(bodies)
}
