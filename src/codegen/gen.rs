//! Method-body generation driver.
//!
//! One `Gen` serves a whole class: it owns nothing per method, creating a
//! fresh buffer/accountant/budget for each body and discarding them when the
//! body is finished or rejected. A limit breach is recovered here, at the
//! method boundary, so one oversized method never aborts its siblings.

use super::code::{Code, ExceptionTableEntry, LineNumberEntry};
use super::constpool::ConstantPool;
use super::diag::Diagnostic;
use super::instr::Instr;
use super::opcodes;
use crate::ast::{MethodBody, MethodId, Type};
use crate::config::Config;
use crate::consts;
use crate::error::{Error, Result};

/// Finished instruction stream of one method, ready for the class writer.
#[derive(Debug, Clone)]
pub struct MethodCode {
    pub id: MethodId,
    pub code: Vec<u8>,
    pub max_stack: u16,
    pub max_locals: u16,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub line_numbers: Vec<LineNumberEntry>,
    /// BootstrapMethods attribute indices this method's call sites reference
    pub bootstrap_methods: Vec<u16>,
}

/// Per-method result: either a validated stream or a limit diagnostic.
/// No partial bytecode is ever exposed.
#[derive(Debug, Clone)]
pub enum MethodOutcome {
    Emitted(MethodCode),
    Rejected(Diagnostic),
}

impl MethodOutcome {
    pub fn emitted(&self) -> Option<&MethodCode> {
        match self {
            MethodOutcome::Emitted(code) => Some(code),
            MethodOutcome::Rejected(_) => None,
        }
    }

    pub fn rejected(&self) -> Option<&Diagnostic> {
        match self {
            MethodOutcome::Emitted(_) => None,
            MethodOutcome::Rejected(diag) => Some(diag),
        }
    }
}

/// Lowered bodies of a class plus the diagnostics of rejected units.
#[derive(Debug, Default)]
pub struct ClassBodies {
    pub methods: Vec<MethodCode>,
    pub diagnostics: Vec<Diagnostic>,
}

enum Attempt {
    Done(MethodOutcome),
    /// a 16-bit jump offset overflowed; re-lower with wide jumps
    NeedsFat,
}

/// Bytecode generator for the method bodies of one class.
pub struct Gen<'a> {
    pool: &'a mut ConstantPool,
    config: &'a Config,
}

impl<'a> Gen<'a> {
    pub fn new(config: &'a Config, pool: &'a mut ConstantPool) -> Self {
        Gen { pool, config }
    }

    /// Lower every body, recovering limit diagnostics per method.
    pub fn generate_class(&mut self, bodies: &[MethodBody]) -> Result<ClassBodies> {
        let mut out = ClassBodies::default();
        for body in bodies {
            match self.generate_method(body)? {
                MethodOutcome::Emitted(code) => out.methods.push(code),
                MethodOutcome::Rejected(diag) => {
                    log::debug!("rejected {}: {}", body.id, diag);
                    out.diagnostics.push(diag);
                }
            }
        }
        Ok(out)
    }

    /// Lower one method or initializer.
    pub fn generate_method(&mut self, method: &MethodBody) -> Result<MethodOutcome> {
        log::debug!("lowering {}", method.id);
        match self.attempt(method, false)? {
            Attempt::Done(outcome) => Ok(outcome),
            Attempt::NeedsFat => {
                log::debug!("re-lowering {} with wide jumps", method.id);
                match self.attempt(method, true)? {
                    Attempt::Done(outcome) => Ok(outcome),
                    // goto_w cannot overflow inside a 64KB method
                    Attempt::NeedsFat => {
                        Err(Error::internal("jump overflow survived wide re-lowering"))
                    }
                }
            }
        }
    }

    fn attempt(&mut self, method: &MethodBody, fatcode: bool) -> Result<Attempt> {
        let code = Code::new(method.max_locals, fatcode, self.config.debug_code);
        let mut body = BodyGen {
            code,
            pool: &mut *self.pool,
            config: self.config,
            return_type: method.return_type.clone(),
            loops: Vec::new(),
            finally_scopes: Vec::new(),
            next_scratch: method.max_locals,
            ret_slot: None,
            bootstrap_used: Vec::new(),
            finally_shapes: rustc_hash::FxHashMap::default(),
        };

        for stmt in &method.body.statements {
            if body.code.over_budget() {
                break;
            }
            body.gen_stmt(stmt)?;
            if body.code.max_stack() > consts::MAX_STACK {
                return Ok(Attempt::Done(MethodOutcome::Rejected(
                    Diagnostic::stack_depth_exceeded(method.id.clone()),
                )));
            }
        }

        if body.code.over_budget() {
            // the partial buffer is discarded with `body`
            return Ok(Attempt::Done(MethodOutcome::Rejected(
                Diagnostic::code_size_exceeded(method.id.clone()),
            )));
        }

        if body.code.is_alive() {
            if method.return_type == Type::Void {
                body.code.emit(Instr::Op(opcodes::RETURN))?;
            } else {
                // flow analysis upstream guarantees a return on every path
                return Err(Error::internal(format!(
                    "missing return lowering {}",
                    method.id
                )));
            }
        }

        if body.code.over_budget() {
            return Ok(Attempt::Done(MethodOutcome::Rejected(
                Diagnostic::code_size_exceeded(method.id.clone()),
            )));
        }
        if body.code.fatcode_needed() && !fatcode {
            return Ok(Attempt::NeedsFat);
        }

        let mut bootstrap_methods = body.bootstrap_used;
        bootstrap_methods.dedup();
        let finished = body.code.finish()?;
        debug_assert!(finished.code.len() <= consts::MAX_CODE_LENGTH);
        if finished.max_stack > consts::MAX_STACK {
            return Ok(Attempt::Done(MethodOutcome::Rejected(
                Diagnostic::stack_depth_exceeded(method.id.clone()),
            )));
        }

        log::debug!(
            "finished {}: {} bytes, max_stack {}, max_locals {}",
            method.id,
            finished.code.len(),
            finished.max_stack,
            finished.max_locals
        );
        Ok(Attempt::Done(MethodOutcome::Emitted(MethodCode {
            id: method.id.clone(),
            code: finished.code,
            max_stack: finished.max_stack as u16,
            max_locals: finished.max_locals,
            exception_table: finished.exception_table,
            line_numbers: finished.line_numbers,
            bootstrap_methods,
        })))
    }
}

/// Loop or switch context for break/continue resolution.
pub(crate) struct LoopCtx {
    pub(crate) break_label: super::code::Label,
    /// None for switch contexts
    pub(crate) continue_label: Option<super::code::Label>,
    /// finally scopes outside this construct; exits do not run deeper ones
    pub(crate) finally_depth: usize,
}

/// Shared lowering state for one method body.
///
/// The expression, control-flow and concat lowering live in sibling modules;
/// all of them emit through `code` and intern through `pool`.
pub(crate) struct BodyGen<'a> {
    pub(crate) code: Code,
    pub(crate) pool: &'a mut ConstantPool,
    pub(crate) config: &'a Config,
    pub(crate) return_type: Type,
    pub(crate) loops: Vec<LoopCtx>,
    pub(crate) finally_scopes: Vec<super::flow::FinallyScope>,
    next_scratch: u16,
    /// scratch slot parking a return value across finally blocks
    pub(crate) ret_slot: Option<u16>,
    pub(crate) bootstrap_used: Vec<u16>,
    /// finally-body fingerprints seen, with emitted copy counts
    pub(crate) finally_shapes: rustc_hash::FxHashMap<u64, u32>,
}

impl<'a> BodyGen<'a> {
    /// Allocate a scratch local past the declared frame.
    pub(crate) fn alloc_scratch(&mut self, width: u16) -> u16 {
        let slot = self.next_scratch;
        self.next_scratch += width;
        self.code.reserve_local(slot, width);
        slot
    }

    /// The slot a return value is parked in while finally blocks run.
    pub(crate) fn return_slot(&mut self) -> u16 {
        match self.ret_slot {
            Some(slot) => slot,
            None => {
                let slot = self.alloc_scratch(self.return_type.width());
                self.ret_slot = Some(slot);
                slot
            }
        }
    }
}
