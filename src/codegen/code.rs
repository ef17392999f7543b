//! Method code buffer.
//!
//! Follows javac's Code.java architecture: one growable byte buffer per
//! method, emission gated by an `alive` flag so unreachable code vanishes,
//! forward jumps collected in chains and patched when their label binds, and
//! stack depth accounted in lock-step with every append.
//!
//! The buffer also owns the method's `SizeBudget`: once an append would cross
//! the 64KB code ceiling the buffer enters a terminal over-budget state and
//! swallows everything that follows. The generator observes the flag at
//! statement boundaries and reports the method instead of emitting a
//! truncated body.

use super::chain::{self, Chain};
use super::instr::{switch_pad, Instr};
use super::opcodes;
use crate::consts;
use crate::error::{Error, Result};

/// Abstract jump target, resolved (bound) exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(pub(crate) u32);

#[derive(Debug, Default)]
struct LabelEntry {
    bound: Option<usize>,
    refs: Option<Box<Chain>>,
}

/// Operand stack accountant (javac State).
#[derive(Debug, Clone, Default)]
pub struct State {
    stacksize: u32,
    max_stacksize: u32,
}

impl State {
    pub fn push(&mut self, n: u32) {
        self.stacksize += n;
        if self.stacksize > self.max_stacksize {
            self.max_stacksize = self.stacksize;
        }
    }

    pub fn pop(&mut self, n: u32, pc: usize) -> Result<()> {
        if n > self.stacksize {
            // A lowering bug, not a user error
            return Err(Error::StackUnderflow { wanted: n, depth: self.stacksize, pc });
        }
        self.stacksize -= n;
        Ok(())
    }

    pub fn current(&self) -> u32 {
        self.stacksize
    }

    pub fn max(&self) -> u32 {
        self.max_stacksize
    }

    fn set_depth(&mut self, depth: u32) {
        self.stacksize = depth;
        if depth > self.max_stacksize {
            self.max_stacksize = depth;
        }
    }
}

/// Read-only view of the 64KB method-code ceiling.
#[derive(Debug, Clone)]
pub struct SizeBudget {
    limit: usize,
    over: bool,
}

impl SizeBudget {
    pub fn new(limit: usize) -> Self {
        SizeBudget { limit, over: false }
    }

    pub fn fits(&self, used: usize, additional: usize) -> bool {
        !self.over && used + additional <= self.limit
    }

    pub fn is_over(&self) -> bool {
        self.over
    }

    pub fn remaining(&self, used: usize) -> usize {
        self.limit.saturating_sub(used)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// 0 for catch-all (finally), otherwise a CONSTANT_Class index
    pub catch_type: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line: u16,
}

/// 4-byte switch arm offset awaiting its label.
#[derive(Debug)]
struct SwitchPatch {
    /// absolute position of the offset slot
    site: usize,
    /// pc of the switch opcode the offset is relative to
    base: usize,
    target: Label,
}

pub struct Code {
    code: Vec<u8>,
    pub state: State,
    pub max_locals: u16,
    alive: bool,
    fatcode: bool,
    /// a 2-byte jump offset overflowed; the method must be re-lowered fat
    fatcode_needed: bool,
    budget: SizeBudget,
    labels: Vec<LabelEntry>,
    switch_patches: Vec<SwitchPatch>,
    pub exception_table: Vec<ExceptionTableEntry>,
    line_numbers: Vec<LineNumberEntry>,
    pending_line: u16,
    debug_code: bool,
}

impl Code {
    pub fn new(max_locals: u16, fatcode: bool, debug_code: bool) -> Self {
        Code {
            code: Vec::with_capacity(64),
            state: State::default(),
            max_locals,
            alive: true,
            fatcode,
            fatcode_needed: false,
            budget: SizeBudget::new(consts::MAX_CODE_LENGTH),
            labels: Vec::new(),
            switch_patches: Vec::new(),
            exception_table: Vec::new(),
            line_numbers: Vec::new(),
            pending_line: 0,
            debug_code,
        }
    }

    pub fn cur_pc(&self) -> usize {
        self.code.len()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn mark_dead(&mut self) {
        self.alive = false;
    }

    pub fn over_budget(&self) -> bool {
        self.budget.is_over()
    }

    pub fn budget(&self) -> &SizeBudget {
        &self.budget
    }

    pub fn fatcode(&self) -> bool {
        self.fatcode
    }

    pub fn fatcode_needed(&self) -> bool {
        self.fatcode_needed
    }

    pub fn max_stack(&self) -> u32 {
        self.state.max()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.code
    }

    /// Mark the start of a statement for the LineNumberTable.
    pub fn stat_begin(&mut self, line: u16) {
        if line != 0 {
            self.pending_line = line;
        }
    }

    /// Grow the frame to cover a scratch slot of the given width.
    pub fn reserve_local(&mut self, slot: u16, width: u16) {
        let top = slot + width;
        if top > self.max_locals {
            self.max_locals = top;
        }
    }

    // ------------------------------------------------------------------
    // label management
    // ------------------------------------------------------------------

    pub fn define_label(&mut self) -> Label {
        let label = Label(self.labels.len() as u32);
        self.labels.push(LabelEntry::default());
        label
    }

    /// Bind `label` to the current pc and patch every pending reference.
    ///
    /// Binding revives dead code: a bound label means somebody jumps here.
    pub fn bind(&mut self, label: Label) -> Result<()> {
        let target = self.cur_pc();
        let entry = &mut self.labels[label.0 as usize];
        if entry.bound.is_some() {
            return Err(Error::LabelRebound { label: label.0 });
        }
        entry.bound = Some(target);
        let refs = entry.refs.take();

        if let Some(chain) = &refs {
            if !self.alive {
                self.alive = true;
                self.state.set_depth(chain.stacksize);
            } else {
                debug_assert_eq!(
                    chain.stacksize,
                    self.state.current(),
                    "stack depth mismatch at label {}",
                    label.0
                );
            }
            if self.debug_code {
                eprintln!("bind L{} -> {} ({} refs)", label.0, target, chain.len());
            }
        }

        let mut next = refs;
        while let Some(c) = next {
            self.patch_jump(c.pc, target);
            next = c.next;
        }
        Ok(())
    }

    /// Declare a dispatch target reachable by table offsets rather than
    /// tracked jump chains (switch arms, resume tables): revive emission at
    /// the given stack depth.
    pub fn entry_point(&mut self, depth: u32) {
        self.alive = true;
        self.state.set_depth(depth);
    }

    /// Enter an exception handler: the stack holds exactly the throwable.
    pub fn enter_handler(&mut self) {
        self.alive = true;
        self.state.set_depth(1);
    }

    pub fn add_exception_entry(&mut self, entry: ExceptionTableEntry) {
        // zero-length ranges arise when a try body was entirely dead code
        if entry.start_pc != entry.end_pc {
            self.exception_table.push(entry);
        }
    }

    // ------------------------------------------------------------------
    // emission
    // ------------------------------------------------------------------

    /// Append one instruction; the single entry point for all emission.
    ///
    /// Dead or over-budget code is swallowed without touching the buffer or
    /// the accountant.
    pub fn emit(&mut self, ins: Instr) -> Result<()> {
        if !self.alive || self.budget.is_over() {
            return Ok(());
        }

        let pc = self.cur_pc();
        let len = ins.encoded_len(pc, self.fatcode);
        if !self.budget.fits(pc, len) {
            self.budget.over = true;
            log::debug!("code budget exceeded at pc {} (+{} bytes)", pc, len);
            return Ok(());
        }

        let (pops, pushes) = ins.stack_effect();
        self.state.pop(pops, pc)?;
        self.state.push(pushes);

        if self.pending_line != 0 {
            let line = self.pending_line;
            self.pending_line = 0;
            if self.line_numbers.last().map(|e| e.line) != Some(line) {
                self.line_numbers.push(LineNumberEntry { start_pc: pc as u16, line });
            }
        }

        if self.debug_code {
            match &ins {
                Instr::Op(op) => eprintln!(
                    "emit@{} stack={}: {}",
                    pc,
                    self.state.current(),
                    opcodes::mnemonic(*op)
                ),
                other => eprintln!("emit@{} stack={}: {:?}", pc, self.state.current(), other),
            }
        }

        let terminal = ins.is_terminal();
        self.encode(ins)?;
        if terminal {
            self.alive = false;
        }
        debug_assert_eq!(self.cur_pc(), pc + len, "encoded length mismatch");
        Ok(())
    }

    fn encode(&mut self, ins: Instr) -> Result<()> {
        match ins {
            Instr::Op(op) => self.emit1(op),
            Instr::Bipush(v) => {
                self.emit1(opcodes::BIPUSH);
                self.emit1(v as u8);
            }
            Instr::Sipush(v) => {
                self.emit1(opcodes::SIPUSH);
                self.emit2(v as u16);
            }
            Instr::Ldc(index) => {
                if index > 0xff {
                    self.emit1(opcodes::LDC_W);
                    self.emit2(index);
                } else {
                    self.emit1(opcodes::LDC);
                    self.emit1(index as u8);
                }
            }
            Instr::Ldc2(index) => {
                self.emit1(opcodes::LDC2_W);
                self.emit2(index);
            }
            Instr::Load { op, slot } => self.emit_local(op, opcodes::ILOAD_0, slot),
            Instr::Store { op, slot } => self.emit_local(op, opcodes::ISTORE_0, slot),
            Instr::Iinc { slot, delta } => {
                if slot > 0xff || delta > i8::MAX as i16 || delta < i8::MIN as i16 {
                    self.emit1(opcodes::WIDE);
                    self.emit1(opcodes::IINC);
                    self.emit2(slot);
                    self.emit2(delta as u16);
                } else {
                    self.emit1(opcodes::IINC);
                    self.emit1(slot as u8);
                    self.emit1(delta as u8);
                }
            }
            Instr::GetStatic { index, .. } => {
                self.emit1(opcodes::GETSTATIC);
                self.emit2(index);
            }
            Instr::PutStatic { index, .. } => {
                self.emit1(opcodes::PUTSTATIC);
                self.emit2(index);
            }
            Instr::Invoke { op, index, .. } => {
                self.emit1(op);
                self.emit2(index);
            }
            Instr::Indy { index, .. } => {
                self.emit1(opcodes::INVOKEDYNAMIC);
                self.emit2(index);
                self.emit2(0);
            }
            Instr::New { index } => {
                self.emit1(opcodes::NEW);
                self.emit2(index);
            }
            Instr::NewArrayPrim { atype } => {
                self.emit1(opcodes::NEWARRAY);
                self.emit1(atype);
            }
            Instr::ANewArray { index } => {
                self.emit1(opcodes::ANEWARRAY);
                self.emit2(index);
            }
            Instr::Checkcast { index } => {
                self.emit1(opcodes::CHECKCAST);
                self.emit2(index);
            }
            Instr::Branch { op, target } => self.encode_branch(op, target)?,
            Instr::TableSwitch { default, low, high, targets } => {
                let base = self.cur_pc();
                self.emit1(opcodes::TABLESWITCH);
                for _ in 0..switch_pad(base) {
                    self.emit1(0);
                }
                self.emit_switch_offset(base, default);
                self.emit4(low as u32);
                self.emit4(high as u32);
                for target in targets {
                    self.emit_switch_offset(base, target);
                }
            }
            Instr::LookupSwitch { default, pairs } => {
                let base = self.cur_pc();
                self.emit1(opcodes::LOOKUPSWITCH);
                for _ in 0..switch_pad(base) {
                    self.emit1(0);
                }
                self.emit_switch_offset(base, default);
                self.emit4(pairs.len() as u32);
                for (key, target) in pairs {
                    self.emit4(key as u32);
                    self.emit_switch_offset(base, target);
                }
            }
        }
        Ok(())
    }

    /// Emit a jump to `target`, wide when in fat mode (javac emitJump).
    fn encode_branch(&mut self, op: u8, target: Label) -> Result<()> {
        if self.fatcode {
            if op == opcodes::GOTO {
                let pc = self.cur_pc();
                self.emit1(opcodes::GOTO_W);
                self.emit4(0);
                self.register_jump(pc, target);
            } else {
                // negated condition skipping over a goto_w
                self.emit1(opcodes::negate(op));
                self.emit2(8);
                let pc = self.cur_pc();
                self.emit1(opcodes::GOTO_W);
                self.emit4(0);
                self.register_jump(pc, target);
            }
        } else {
            let pc = self.cur_pc();
            self.emit1(op);
            self.emit2(0);
            self.register_jump(pc, target);
        }
        Ok(())
    }

    fn register_jump(&mut self, pc: usize, target: Label) {
        let entry = &mut self.labels[target.0 as usize];
        if let Some(bound) = entry.bound {
            self.patch_jump(pc, bound);
        } else {
            let stacksize = self.state.current();
            let refs = entry.refs.take();
            entry.refs = chain::merge(Some(Chain::new(pc, stacksize, None)), refs);
        }
    }

    /// Rewrite the operand of the jump instruction at `pc` to reach `target`.
    fn patch_jump(&mut self, pc: usize, target: usize) {
        let offset = target as i64 - pc as i64;
        match self.code[pc] {
            opcodes::GOTO_W => self.put4(pc + 1, offset as i32),
            _ => {
                if offset < i16::MIN as i64 || offset > i16::MAX as i64 {
                    self.fatcode_needed = true;
                } else {
                    self.put2(pc + 1, offset as i16 as u16);
                }
            }
        }
    }

    fn emit_switch_offset(&mut self, base: usize, target: Label) {
        let entry = &self.labels[target.0 as usize];
        if let Some(bound) = entry.bound {
            let offset = bound as i64 - base as i64;
            self.emit4(offset as i32 as u32);
        } else {
            let site = self.cur_pc();
            self.emit4(0);
            self.switch_patches.push(SwitchPatch { site, base, target });
        }
    }

    fn emit_local(&mut self, op: u8, base_0: u8, slot: u16) {
        // iload..aload / istore..astore occupy contiguous opcode blocks, and
        // their _n forms follow the same type order four slots apart
        let ty_index = if base_0 == opcodes::ILOAD_0 {
            op - opcodes::ILOAD
        } else {
            op - opcodes::ISTORE
        };
        if slot <= 3 {
            self.emit1(base_0 + ty_index * 4 + slot as u8);
        } else if slot <= 0xff {
            self.emit1(op);
            self.emit1(slot as u8);
        } else {
            self.emit1(opcodes::WIDE);
            self.emit1(op);
            self.emit2(slot);
        }
    }

    // ------------------------------------------------------------------
    // byte-level primitives (javac emit1/emit2/emit4, put2/put4)
    // ------------------------------------------------------------------

    fn emit1(&mut self, b: u8) {
        self.code.push(b);
    }

    fn emit2(&mut self, v: u16) {
        self.code.extend_from_slice(&v.to_be_bytes());
    }

    fn emit4(&mut self, v: u32) {
        self.code.extend_from_slice(&v.to_be_bytes());
    }

    fn put2(&mut self, pos: usize, v: u16) {
        self.code[pos..pos + 2].copy_from_slice(&v.to_be_bytes());
    }

    fn put4(&mut self, pos: usize, v: i32) {
        self.code[pos..pos + 4].copy_from_slice(&v.to_be_bytes());
    }

    // ------------------------------------------------------------------
    // finalization
    // ------------------------------------------------------------------

    /// Resolve switch patches and audit labels, then hand back the bytes.
    ///
    /// An unbound label with references is a lowering defect; finalization
    /// refuses to produce a stream containing dangling offsets.
    pub fn finish(mut self) -> Result<FinishedCode> {
        for patch in std::mem::take(&mut self.switch_patches) {
            let bound = self.labels[patch.target.0 as usize]
                .bound
                .ok_or(Error::UnresolvedLabel { label: patch.target.0 })?;
            let offset = bound as i64 - patch.base as i64;
            self.put4(patch.site, offset as i32);
        }
        for (index, entry) in self.labels.iter().enumerate() {
            if entry.refs.is_some() {
                return Err(Error::UnresolvedLabel { label: index as u32 });
            }
        }
        Ok(FinishedCode {
            code: self.code,
            max_stack: self.state.max(),
            max_locals: self.max_locals,
            exception_table: self.exception_table,
            line_numbers: self.line_numbers,
        })
    }
}

/// Validated instruction stream of one method, ready for the class writer.
#[derive(Debug, Clone)]
pub struct FinishedCode {
    pub code: Vec<u8>,
    pub max_stack: u32,
    pub max_locals: u16,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub line_numbers: Vec<LineNumberEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::opcodes as op;

    #[test]
    fn forward_jump_is_patched_on_bind() {
        let mut code = Code::new(1, false, false);
        let end = code.define_label();
        code.emit(Instr::Op(op::ICONST_0)).unwrap();
        code.emit(Instr::Branch { op: op::IFEQ, target: end }).unwrap();
        code.emit(Instr::Op(op::NOP)).unwrap();
        code.bind(end).unwrap();
        code.emit(Instr::Op(op::RETURN)).unwrap();
        let done = code.finish().unwrap();
        // iconst_0 at 0, ifeq at 1 with offset to 5
        assert_eq!(done.code[1], op::IFEQ);
        assert_eq!(u16::from_be_bytes([done.code[2], done.code[3]]), 4);
    }

    #[test]
    fn backward_jump_is_immediate() {
        let mut code = Code::new(1, false, false);
        let top = code.define_label();
        code.bind(top).unwrap();
        code.emit(Instr::Op(op::NOP)).unwrap();
        code.emit(Instr::Branch { op: op::GOTO, target: top }).unwrap();
        let done = code.finish().unwrap();
        assert_eq!(done.code[1], op::GOTO);
        assert_eq!(i16::from_be_bytes([done.code[2], done.code[3]]), -1);
    }

    #[test]
    fn stack_accounting_tracks_max() {
        let mut code = Code::new(1, false, false);
        code.emit(Instr::Op(op::ICONST_1)).unwrap();
        code.emit(Instr::Op(op::ICONST_2)).unwrap();
        code.emit(Instr::Op(op::IADD)).unwrap();
        assert_eq!(code.state.current(), 1);
        assert_eq!(code.max_stack(), 2);
    }

    #[test]
    fn stack_underflow_is_internal_error() {
        let mut code = Code::new(1, false, false);
        let err = code.emit(Instr::Op(op::IADD)).unwrap_err();
        assert!(matches!(err, Error::StackUnderflow { .. }));
    }

    #[test]
    fn dead_code_is_swallowed() {
        let mut code = Code::new(1, false, false);
        code.emit(Instr::Op(op::RETURN)).unwrap();
        let pc = code.cur_pc();
        code.emit(Instr::Op(op::ICONST_0)).unwrap();
        code.emit(Instr::Op(op::POP)).unwrap();
        assert_eq!(code.cur_pc(), pc);
    }

    #[test]
    fn bind_revives_dead_code_with_chain_depth() {
        let mut code = Code::new(1, false, false);
        let target = code.define_label();
        code.emit(Instr::Op(op::ICONST_0)).unwrap();
        code.emit(Instr::Branch { op: op::GOTO, target }).unwrap();
        assert!(!code.is_alive());
        code.bind(target).unwrap();
        assert!(code.is_alive());
        assert_eq!(code.state.current(), 1);
    }

    #[test]
    fn budget_breach_is_terminal() {
        let mut code = Code::new(1, false, false);
        // nops almost to the ceiling, then one instruction that cannot fit
        for _ in 0..consts::MAX_CODE_LENGTH - 1 {
            code.emit(Instr::Op(op::NOP)).unwrap();
        }
        assert!(!code.over_budget());
        code.emit(Instr::Sipush(7)).unwrap();
        assert!(code.over_budget());
        // nothing was appended, and later emissions are swallowed
        assert_eq!(code.cur_pc(), consts::MAX_CODE_LENGTH - 1);
        code.emit(Instr::Op(op::NOP)).unwrap();
        assert_eq!(code.cur_pc(), consts::MAX_CODE_LENGTH - 1);
    }

    #[test]
    fn unresolved_label_fails_finish() {
        let mut code = Code::new(1, false, false);
        let dangling = code.define_label();
        code.emit(Instr::Op(op::ICONST_0)).unwrap();
        code.emit(Instr::Branch { op: op::IFEQ, target: dangling }).unwrap();
        assert!(matches!(code.finish(), Err(Error::UnresolvedLabel { .. })));
    }

    #[test]
    fn fat_goto_uses_wide_encoding() {
        let mut code = Code::new(1, true, false);
        let target = code.define_label();
        code.emit(Instr::Branch { op: op::GOTO, target }).unwrap();
        code.bind(target).unwrap();
        code.emit(Instr::Op(op::RETURN)).unwrap();
        let done = code.finish().unwrap();
        assert_eq!(done.code[0], op::GOTO_W);
        assert_eq!(i32::from_be_bytes([done.code[1], done.code[2], done.code[3], done.code[4]]), 5);
    }

    #[test]
    fn fat_conditional_negates_and_widens() {
        let mut code = Code::new(1, true, false);
        let target = code.define_label();
        code.emit(Instr::Op(op::ICONST_0)).unwrap();
        code.emit(Instr::Branch { op: op::IFEQ, target }).unwrap();
        code.bind(target).unwrap();
        code.emit(Instr::Op(op::RETURN)).unwrap();
        let done = code.finish().unwrap();
        assert_eq!(done.code[1], op::IFNE);
        assert_eq!(u16::from_be_bytes([done.code[2], done.code[3]]), 8);
        assert_eq!(done.code[4], op::GOTO_W);
    }

    #[test]
    fn wide_local_forms() {
        let mut code = Code::new(400, false, false);
        code.emit(Instr::Load { op: op::ILOAD, slot: 2 }).unwrap();
        code.emit(Instr::Load { op: op::ILOAD, slot: 300 }).unwrap();
        let done = code.finish().unwrap();
        assert_eq!(done.code[0], op::ILOAD_0 + 2);
        assert_eq!(done.code[1], op::WIDE);
        assert_eq!(done.code[2], op::ILOAD);
        assert_eq!(u16::from_be_bytes([done.code[3], done.code[4]]), 300);
    }

    #[test]
    fn tableswitch_alignment_and_offsets() {
        let mut code = Code::new(1, false, false);
        let default = code.define_label();
        let arm = code.define_label();
        code.emit(Instr::Op(op::ICONST_0)).unwrap();
        code.emit(Instr::TableSwitch {
            default,
            low: 0,
            high: 0,
            targets: vec![arm],
        })
        .unwrap();
        code.bind(arm).unwrap();
        code.emit(Instr::Op(op::RETURN)).unwrap();
        code.bind(default).unwrap();
        code.emit(Instr::Op(op::RETURN)).unwrap();
        let done = code.finish().unwrap();
        // opcode at 1, padding to 4, default/lo/hi/one offset = 16 operand bytes
        assert_eq!(done.code[1], op::TABLESWITCH);
        assert_eq!(done.code.len(), 1 + 1 + 2 + 16 + 2);
        let arm_off =
            i32::from_be_bytes([done.code[16], done.code[17], done.code[18], done.code[19]]);
        assert_eq!(arm_off as usize, 20 - 1);
    }
}
