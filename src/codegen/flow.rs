//! Statement lowering: if/while/for/switch/try and the exit-edge machinery.
//!
//! Switch lowering picks tableswitch or lookupswitch with javac's cost model;
//! the chosen representative depends only on the case-value set, so identical
//! switches lower to identical bytes.
//!
//! Try-statements drive the code-size story. Every path that leaves a try
//! with a finally clause (falling off the end, return, break, continue, and
//! the implicit rethrow) must run the finally body. With sharing disabled
//! each exit edge receives its own inline copy, multiplying the block by the
//! edge count. With sharing enabled the body is emitted once: each edge
//! parks a small selector in a scratch local and jumps to the shared block,
//! and a resume table after the block routes every selector back to its
//! original continuation. A region walks NORMAL -> IN_FINALLY -> DISPATCHED
//! as its edges are discovered and rewired.

use super::code::{ExceptionTableEntry, Label};
use super::expr::{load_op, return_op, store_op};
use super::gen::{BodyGen, LoopCtx};
use super::instr::Instr;
use super::opcodes;
use crate::ast::*;
use crate::error::{Error, Result};

/// Lifecycle of one try region's finally handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionState {
    Normal,
    InFinally,
    Dispatched,
}

/// How control is trying to leave the current statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExitKind {
    Return,
    /// index into the loop context stack
    Break(usize),
    Continue(usize),
}

/// An exit edge routed through a shared finally block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    FallThrough,
    Return,
    Break(usize),
    Continue(usize),
    Rethrow,
}

struct SharedFinally {
    enter: Label,
    sel_slot: u16,
    thr_slot: u16,
    edges: Vec<Edge>,
    state: RegionState,
}

/// One enclosing try-with-finally while its body is being lowered.
pub(crate) struct FinallyScope {
    block: Block,
    /// None lowers an inline copy per exit edge
    shared: Option<SharedFinally>,
    /// fingerprint of the lowered body shape
    key: u64,
}

impl<'a> BodyGen<'a> {
    pub(crate) fn gen_block(&mut self, block: &Block) -> Result<()> {
        for stmt in &block.statements {
            if self.code.over_budget() {
                return Ok(());
            }
            self.gen_stmt(stmt)?;
        }
        Ok(())
    }

    pub(crate) fn gen_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Expression(s) => {
                self.code.stat_begin(s.span.line);
                self.gen_expr_stmt(&s.expr)
            }
            Stmt::LocalDecl(s) => {
                self.code.stat_begin(s.span.line);
                if let Some(init) = &s.init {
                    self.gen_expr(init)?;
                    self.emit_convert(&init.ty(), &s.local.ty)?;
                    self.code.emit(Instr::Store {
                        op: store_op(&s.local.ty),
                        slot: s.local.slot,
                    })?;
                }
                Ok(())
            }
            Stmt::If(s) => self.gen_if(s),
            Stmt::While(s) => self.gen_while(s),
            Stmt::For(s) => self.gen_for(s),
            Stmt::Switch(s) => self.gen_switch(s),
            Stmt::Return(s) => self.gen_return(s),
            Stmt::Break(s) => {
                self.code.stat_begin(s.span.line);
                let target = self
                    .loops
                    .len()
                    .checked_sub(1)
                    .ok_or_else(|| Error::internal("break outside loop or switch"))?;
                self.emit_exit(ExitKind::Break(target))
            }
            Stmt::Continue(s) => {
                self.code.stat_begin(s.span.line);
                let target = self
                    .loops
                    .iter()
                    .rposition(|ctx| ctx.continue_label.is_some())
                    .ok_or_else(|| Error::internal("continue outside loop"))?;
                self.emit_exit(ExitKind::Continue(target))
            }
            Stmt::Throw(s) => {
                self.code.stat_begin(s.span.line);
                self.gen_expr(&s.expr)?;
                self.code.emit(Instr::Op(opcodes::ATHROW))
            }
            Stmt::Try(s) => self.gen_try(s),
            Stmt::Block(b) => self.gen_block(b),
            Stmt::Empty => Ok(()),
        }
    }

    fn gen_if(&mut self, s: &IfStmt) -> Result<()> {
        self.code.stat_begin(s.span.line);
        match &s.else_branch {
            None => {
                let end = self.code.define_label();
                self.jump_if(&s.condition, false, end)?;
                self.gen_stmt(&s.then_branch)?;
                self.code.bind(end)
            }
            Some(else_branch) => {
                let else_label = self.code.define_label();
                let end = self.code.define_label();
                self.jump_if(&s.condition, false, else_label)?;
                self.gen_stmt(&s.then_branch)?;
                self.code.emit(Instr::Branch { op: opcodes::GOTO, target: end })?;
                self.code.bind(else_label)?;
                self.gen_stmt(else_branch)?;
                self.code.bind(end)
            }
        }
    }

    fn gen_while(&mut self, s: &WhileStmt) -> Result<()> {
        self.code.stat_begin(s.span.line);
        let test = self.code.define_label();
        let exit = self.code.define_label();
        self.loops.push(LoopCtx {
            break_label: exit,
            continue_label: Some(test),
            finally_depth: self.finally_scopes.len(),
        });
        self.code.bind(test)?;
        self.jump_if(&s.condition, false, exit)?;
        self.gen_stmt(&s.body)?;
        self.code.emit(Instr::Branch { op: opcodes::GOTO, target: test })?;
        self.code.bind(exit)?;
        self.loops.pop();
        Ok(())
    }

    fn gen_for(&mut self, s: &ForStmt) -> Result<()> {
        self.code.stat_begin(s.span.line);
        for init in &s.init {
            self.gen_stmt(init)?;
        }
        let test = self.code.define_label();
        let update = self.code.define_label();
        let exit = self.code.define_label();
        self.loops.push(LoopCtx {
            break_label: exit,
            continue_label: Some(update),
            finally_depth: self.finally_scopes.len(),
        });
        self.code.bind(test)?;
        if let Some(condition) = &s.condition {
            self.jump_if(condition, false, exit)?;
        }
        self.gen_stmt(&s.body)?;
        self.code.bind(update)?;
        for u in &s.update {
            self.gen_expr_stmt(u)?;
        }
        self.code.emit(Instr::Branch { op: opcodes::GOTO, target: test })?;
        self.code.bind(exit)?;
        self.loops.pop();
        Ok(())
    }

    // ------------------------------------------------------------------
    // switch
    // ------------------------------------------------------------------

    fn gen_switch(&mut self, s: &SwitchStmt) -> Result<()> {
        // arm entry points would revive unreachable code
        if !self.code.is_alive() {
            return Ok(());
        }
        self.code.stat_begin(s.span.line);
        self.gen_expr(&s.selector)?;

        let exit = self.code.define_label();
        let mut default_label = exit;
        let mut has_default = false;
        let mut arm_labels = Vec::with_capacity(s.cases.len());
        let mut keyed: Vec<(i32, Label)> = Vec::new();
        for case in &s.cases {
            let label = self.code.define_label();
            arm_labels.push(label);
            if case.labels.is_empty() {
                default_label = label;
                has_default = true;
            } else {
                for &value in &case.labels {
                    keyed.push((value, label));
                }
            }
        }
        keyed.sort_by_key(|(value, _)| *value);
        debug_assert!(
            keyed.windows(2).all(|w| w[0].0 < w[1].0),
            "duplicate case labels survived attribution"
        );

        let keys: Vec<i32> = keyed.iter().map(|(v, _)| *v).collect();
        let kind = select_switch(&keys);
        log::trace!("switch on {} cases -> {:?}", keys.len(), kind);
        let ins = match kind {
            SwitchKind::Table { low, high } => {
                let mut targets = Vec::with_capacity((high as i64 - low as i64 + 1) as usize);
                let mut next = 0usize;
                for value in low..=high {
                    if next < keyed.len() && keyed[next].0 == value {
                        targets.push(keyed[next].1);
                        next += 1;
                    } else {
                        targets.push(default_label);
                    }
                }
                Instr::TableSwitch { default: default_label, low, high, targets }
            }
            SwitchKind::Lookup => Instr::LookupSwitch { default: default_label, pairs: keyed },
        };
        self.code.emit(ins)?;

        self.loops.push(LoopCtx {
            break_label: exit,
            continue_label: None,
            finally_depth: self.finally_scopes.len(),
        });
        for (case, label) in s.cases.iter().zip(arm_labels) {
            self.code.bind(label)?;
            // arms are reached through table offsets, not tracked chains
            self.code.entry_point(0);
            for stmt in &case.statements {
                if self.code.over_budget() {
                    break;
                }
                self.gen_stmt(stmt)?;
            }
        }
        self.loops.pop();
        self.code.bind(exit)?;
        if !has_default {
            // the default arm lands directly here
            self.code.entry_point(0);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // returns and structured exits
    // ------------------------------------------------------------------

    fn gen_return(&mut self, s: &ReturnStmt) -> Result<()> {
        self.code.stat_begin(s.span.line);
        if let Some(value) = &s.value {
            self.gen_expr(value)?;
            self.emit_convert(&value.ty(), &self.return_type.clone())?;
            if self.finally_scopes.is_empty() {
                return self.code.emit(Instr::Op(return_op(&self.return_type)));
            }
            // park the value while finally blocks run
            let ty = self.return_type.clone();
            let slot = self.return_slot();
            self.code.emit(Instr::Store { op: store_op(&ty), slot })?;
        } else if self.finally_scopes.is_empty() {
            return self.code.emit(Instr::Op(opcodes::RETURN));
        }
        self.emit_exit(ExitKind::Return)
    }

    /// Leave the current statement through every intervening finally block.
    ///
    /// Inline regions get their copy lowered right here; a sharing region
    /// swallows the exit as an edge and its resume table carries the rest of
    /// the walk, so at most one selector jump is emitted per exit site.
    pub(crate) fn emit_exit(&mut self, kind: ExitKind) -> Result<()> {
        // never register edges or inline copies on behalf of dead code
        if !self.code.is_alive() {
            return Ok(());
        }
        let boundary = match kind {
            ExitKind::Return => 0,
            ExitKind::Break(target) | ExitKind::Continue(target) => {
                self.loops[target].finally_depth
            }
        };
        let mut depth = self.finally_scopes.len();
        while depth > boundary {
            depth -= 1;
            if self.finally_scopes[depth].shared.is_some() {
                let edge = match kind {
                    ExitKind::Return => Edge::Return,
                    ExitKind::Break(target) => Edge::Break(target),
                    ExitKind::Continue(target) => Edge::Continue(target),
                };
                return self.enter_shared(depth, edge);
            }
            let block = self.finally_scopes[depth].block.clone();
            let key = self.finally_scopes[depth].key;
            self.count_finally_copy(key);
            self.gen_block(&block)?;
        }
        match kind {
            ExitKind::Return => {
                if self.return_type == Type::Void {
                    self.code.emit(Instr::Op(opcodes::RETURN))
                } else {
                    let ty = self.return_type.clone();
                    let slot = self.return_slot();
                    self.code.emit(Instr::Load { op: load_op(&ty), slot })?;
                    self.code.emit(Instr::Op(return_op(&ty)))
                }
            }
            ExitKind::Break(target) => {
                let label = self.loops[target].break_label;
                self.code.emit(Instr::Branch { op: opcodes::GOTO, target: label })
            }
            ExitKind::Continue(target) => {
                let label = self.loops[target]
                    .continue_label
                    .ok_or_else(|| Error::internal("continue into a switch context"))?;
                self.code.emit(Instr::Branch { op: opcodes::GOTO, target: label })
            }
        }
    }

    /// Rewire one exit edge through a sharing region's finally block.
    fn enter_shared(&mut self, depth: usize, edge: Edge) -> Result<()> {
        let scope = self.finally_scopes[depth]
            .shared
            .as_mut()
            .expect("sharing region");
        let selector = match scope.edges.iter().position(|e| *e == edge) {
            Some(index) => index,
            None => {
                scope.edges.push(edge);
                scope.edges.len() - 1
            }
        };
        let sel_slot = scope.sel_slot;
        let enter = scope.enter;
        self.gen_literal(&Literal::Int(selector as i32))?;
        self.code.emit(Instr::Store { op: opcodes::ISTORE, slot: sel_slot })?;
        self.code.emit(Instr::Branch { op: opcodes::GOTO, target: enter })
    }

    // ------------------------------------------------------------------
    // try / catch / finally
    // ------------------------------------------------------------------

    fn gen_try(&mut self, s: &TryStmt) -> Result<()> {
        // handler entry points would revive unreachable code
        if !self.code.is_alive() {
            return Ok(());
        }
        self.code.stat_begin(s.span.line);
        let after = self.code.define_label();

        let has_finally = if let Some(finally_block) = &s.finally_block {
            let key = self.fingerprint_finally(finally_block)?;
            let shared = if self.config.share_finally {
                Some(SharedFinally {
                    enter: self.code.define_label(),
                    sel_slot: self.alloc_scratch(1),
                    thr_slot: self.alloc_scratch(1),
                    edges: Vec::new(),
                    state: RegionState::Normal,
                })
            } else {
                None
            };
            log::trace!(
                "try-finally: shape {:016x}, sharing {}",
                key,
                shared.is_some()
            );
            self.finally_scopes.push(FinallyScope {
                block: finally_block.clone(),
                shared,
                key,
            });
            true
        } else {
            false
        };

        let start_pc = self.code.cur_pc();
        self.gen_block(&s.body)?;
        let end_pc = self.code.cur_pc();
        if self.code.is_alive() {
            self.leave_region_normally(has_finally, after)?;
        }

        // catch clauses protect the try body only
        let mut protected: Vec<(usize, usize)> = vec![(start_pc, end_pc)];
        for catch in &s.catches {
            let handler_pc = self.code.cur_pc();
            self.code.enter_handler();
            let catch_type = self.pool.add_class(&catch.class)?;
            self.code.add_exception_entry(ExceptionTableEntry {
                start_pc: start_pc as u16,
                end_pc: end_pc as u16,
                handler_pc: handler_pc as u16,
                catch_type,
            });
            self.code.emit(Instr::Store { op: opcodes::ASTORE, slot: catch.slot })?;
            self.gen_block(&catch.block)?;
            // the catch body is itself protected by the finally, but the
            // per-edge finally code that follows it must not be, or the
            // handler would reenter itself
            protected.push((handler_pc, self.code.cur_pc()));
            if self.code.is_alive() {
                self.leave_region_normally(has_finally, after)?;
            }
        }

        if has_finally {
            let mut scope = self.finally_scopes.pop().expect("finally scope");
            let handler_pc = self.code.cur_pc();
            self.code.enter_handler();
            for (range_start, range_end) in protected {
                self.code.add_exception_entry(ExceptionTableEntry {
                    start_pc: range_start as u16,
                    end_pc: range_end as u16,
                    handler_pc: handler_pc as u16,
                    catch_type: 0,
                });
            }
            if let Some(shared) = scope.shared.as_mut() {
                let thr_slot = shared.thr_slot;
                let sel_slot = shared.sel_slot;
                let enter = shared.enter;
                let selector = match shared.edges.iter().position(|e| *e == Edge::Rethrow) {
                    Some(index) => index,
                    None => {
                        shared.edges.push(Edge::Rethrow);
                        shared.edges.len() - 1
                    }
                };
                self.code.emit(Instr::Store { op: opcodes::ASTORE, slot: thr_slot })?;
                self.gen_literal(&Literal::Int(selector as i32))?;
                self.code.emit(Instr::Store { op: opcodes::ISTORE, slot: sel_slot })?;
                self.code.emit(Instr::Branch { op: opcodes::GOTO, target: enter })?;
                self.emit_shared_finally(scope, after)?;
            } else {
                let thr_slot = self.alloc_scratch(1);
                self.code.emit(Instr::Store { op: opcodes::ASTORE, slot: thr_slot })?;
                self.emit_finally_copy(&scope)?;
                self.code.emit(Instr::Load { op: opcodes::ALOAD, slot: thr_slot })?;
                self.code.emit(Instr::Op(opcodes::ATHROW))?;
            }
        }
        self.code.bind(after)
    }

    /// Normal completion of a try or catch body: run (or enter) the finally,
    /// then continue after the statement.
    fn leave_region_normally(&mut self, has_finally: bool, after: Label) -> Result<()> {
        if has_finally {
            let depth = self.finally_scopes.len() - 1;
            if self.finally_scopes[depth].shared.is_some() {
                return self.enter_shared(depth, Edge::FallThrough);
            }
            let block = self.finally_scopes[depth].block.clone();
            let key = self.finally_scopes[depth].key;
            self.count_finally_copy(key);
            self.gen_block(&block)?;
        }
        self.code.emit(Instr::Branch { op: opcodes::GOTO, target: after })
    }

    fn emit_finally_copy(&mut self, scope: &FinallyScope) -> Result<()> {
        self.count_finally_copy(scope.key);
        let block = scope.block.clone();
        self.gen_block(&block)
    }

    fn count_finally_copy(&mut self, key: u64) {
        let copies = self.finally_shapes.entry(key).or_insert(0);
        *copies += 1;
        if *copies > 1 {
            log::trace!("finally shape {:016x} now has {} copies", key, copies);
        }
    }

    /// Emit the single shared finally body and its resume table.
    fn emit_shared_finally(&mut self, mut scope: FinallyScope, after: Label) -> Result<()> {
        let mut shared = scope.shared.take().expect("sharing region");
        shared.state = RegionState::InFinally;
        log::trace!(
            "finally region {:016x}: {:?}, {} edge(s)",
            scope.key,
            shared.state,
            shared.edges.len()
        );
        self.code.bind(shared.enter)?;
        self.count_finally_copy(scope.key);
        self.gen_block(&scope.block)?;

        shared.state = RegionState::Dispatched;
        log::trace!("finally region {:016x}: {:?}", scope.key, shared.state);
        if !self.code.is_alive() {
            // the finally body itself never completes; no resumption needed
            return Ok(());
        }
        if shared.edges.len() == 1 {
            return self.emit_resume(shared.edges[0], &shared, after);
        }
        self.code.emit(Instr::Load { op: opcodes::ILOAD, slot: shared.sel_slot })?;
        let arm_labels: Vec<Label> =
            shared.edges.iter().map(|_| self.code.define_label()).collect();
        self.code.emit(Instr::TableSwitch {
            default: arm_labels[0],
            low: 0,
            high: (shared.edges.len() - 1) as i32,
            targets: arm_labels.clone(),
        })?;
        for (edge, label) in shared.edges.clone().into_iter().zip(arm_labels) {
            self.code.bind(label)?;
            self.code.entry_point(0);
            self.emit_resume(edge, &shared, after)?;
        }
        Ok(())
    }

    /// Resume one edge's original continuation after the shared block ran.
    fn emit_resume(&mut self, edge: Edge, shared: &SharedFinally, after: Label) -> Result<()> {
        match edge {
            Edge::FallThrough => {
                self.code.emit(Instr::Branch { op: opcodes::GOTO, target: after })
            }
            Edge::Return => self.emit_exit(ExitKind::Return),
            Edge::Break(target) => self.emit_exit(ExitKind::Break(target)),
            Edge::Continue(target) => self.emit_exit(ExitKind::Continue(target)),
            Edge::Rethrow => {
                self.code.emit(Instr::Load { op: opcodes::ALOAD, slot: shared.thr_slot })?;
                self.code.emit(Instr::Op(opcodes::ATHROW))
            }
        }
    }

    /// Lower the finally body into a scratch buffer and fingerprint its
    /// byte shape. The scratch bytes are discarded; only the key survives.
    fn fingerprint_finally(&mut self, block: &Block) -> Result<u64> {
        let scratch = super::code::Code::new(
            self.code.max_locals,
            self.code.fatcode(),
            false,
        );
        let saved = std::mem::replace(&mut self.code, scratch);
        let lowered = self.gen_block(block);
        let scratch = std::mem::replace(&mut self.code, saved);
        lowered?;
        Ok(fnv1a(scratch.bytes()))
    }
}

/// Switch encoding choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SwitchKind {
    Table { low: i32, high: i32 },
    Lookup,
}

/// javac's space/time cost model for switch encoding selection.
pub(crate) fn select_switch(keys: &[i32]) -> SwitchKind {
    let Some((&low, &high)) = keys.first().zip(keys.last()) else {
        return SwitchKind::Lookup;
    };
    let nlabels = keys.len() as i64;
    let table_space_cost = 4 + (high as i64 - low as i64 + 1);
    let table_time_cost = 3i64;
    let lookup_space_cost = 3 + 2 * nlabels;
    let lookup_time_cost = nlabels;
    if table_space_cost + 3 * table_time_cost <= lookup_space_cost + 3 * lookup_time_cost {
        SwitchKind::Table { low, high }
    } else {
        SwitchKind::Lookup
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_cases_pick_tableswitch() {
        assert_eq!(
            select_switch(&[0, 1, 2, 3, 4]),
            SwitchKind::Table { low: 0, high: 4 }
        );
    }

    #[test]
    fn sparse_cases_pick_lookupswitch() {
        assert_eq!(select_switch(&[0, 1000, 2_000_000]), SwitchKind::Lookup);
        assert_eq!(select_switch(&[]), SwitchKind::Lookup);
        // the time term tips tiny switches toward lookup in javac's model
        assert_eq!(select_switch(&[7]), SwitchKind::Lookup);
    }

    #[test]
    fn small_gaps_still_favor_table() {
        // 0,2,4,6: table space 4+7=11, lookup 3+8=11; times 3*3=9 vs 3*4=12
        assert_eq!(
            select_switch(&[0, 2, 4, 6]),
            SwitchKind::Table { low: 0, high: 6 }
        );
    }

    #[test]
    fn fingerprint_is_stable_and_shape_sensitive() {
        assert_eq!(fnv1a(&[1, 2, 3]), fnv1a(&[1, 2, 3]));
        assert_ne!(fnv1a(&[1, 2, 3]), fnv1a(&[3, 2, 1]));
        assert_ne!(fnv1a(&[]), fnv1a(&[0]));
    }
}
