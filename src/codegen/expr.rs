//! Expression lowering.
//!
//! Emits the instructions for one expression, leaving exactly one value (or
//! none, for void calls) on the operand stack.
//!
//! Trees are walked with an explicit task stack rather than native
//! recursion: `gen_expr` pushes evaluate/convert/emit frames onto a Vec and
//! loops, so a binary or concatenation chain nested tens of thousands deep
//! costs heap, never host stack. Condition-shaped subtrees (comparisons,
//! `&&`/`||`, `?:`) branch through labels and are dispatched out of the same
//! loop; only alternation between expression kinds re-enters it.

use super::code::Label;
use super::gen::BodyGen;
use super::instr::{descriptor_slots, Instr};
use super::opcodes;
use crate::ast::*;
use crate::error::{Error, Result};

/// One frame of the explicit evaluation stack.
enum Task<'e> {
    Eval(&'e Expr),
    Emit(Instr),
    Convert { from: Type, to: Type },
}

impl<'a> BodyGen<'a> {
    /// Lower `expr`, leaving its value on the operand stack.
    pub(crate) fn gen_expr(&mut self, root: &Expr) -> Result<()> {
        let mut tasks: Vec<Task<'_>> = vec![Task::Eval(root)];
        while let Some(task) = tasks.pop() {
            if self.code.over_budget() {
                // the driver reports the method; no point walking further
                return Ok(());
            }
            match task {
                Task::Emit(ins) => self.code.emit(ins)?,
                Task::Convert { from, to } => self.emit_convert(&from, &to)?,
                Task::Eval(expr) => self.eval(expr, &mut tasks)?,
            }
        }
        Ok(())
    }

    fn eval<'e>(&mut self, expr: &'e Expr, tasks: &mut Vec<Task<'e>>) -> Result<()> {
        match expr {
            Expr::Literal(e) => self.gen_literal(&e.value)?,
            Expr::Local(e) => {
                self.check_slot(&e.local)?;
                self.code.emit(Instr::Load {
                    op: load_op(&e.local.ty),
                    slot: e.local.slot,
                })?;
            }
            Expr::StaticGet(e) => {
                let ins = self.static_field(&e.field, false)?;
                self.code.emit(ins)?;
            }
            Expr::ArrayGet(e) => {
                tasks.push(Task::Emit(Instr::Op(array_load_op(&e.elem))));
                tasks.push(Task::Eval(&e.index));
                tasks.push(Task::Eval(&e.array));
            }
            Expr::Binary(e) => {
                if expr.is_string_concat() {
                    self.gen_concat(expr)?;
                } else if e.op.is_comparison() || e.op.is_logical() {
                    self.gen_cond_value(expr)?;
                } else {
                    self.eval_arith(e, tasks)?;
                }
            }
            Expr::Unary(e) => match e.op {
                UnaryOp::Neg => {
                    let operand_ty = e.operand.ty();
                    tasks.push(Task::Emit(Instr::Op(neg_op(&e.ty))));
                    tasks.push(Task::Convert { from: operand_ty, to: e.ty.clone() });
                    tasks.push(Task::Eval(&e.operand));
                }
                UnaryOp::BitNot => {
                    // javac shape: x ^ -1
                    let operand_ty = e.operand.ty();
                    match &e.ty {
                        Type::Long => {
                            tasks.push(Task::Emit(Instr::Op(opcodes::LXOR)));
                            tasks.push(Task::Emit(Instr::Ldc2(self.pool.add_long(-1)?)));
                        }
                        _ => {
                            tasks.push(Task::Emit(Instr::Op(opcodes::IXOR)));
                            tasks.push(Task::Emit(Instr::Op(opcodes::ICONST_M1)));
                        }
                    }
                    tasks.push(Task::Convert { from: operand_ty, to: e.ty.clone() });
                    tasks.push(Task::Eval(&e.operand));
                }
                UnaryOp::Not => self.gen_cond_value(expr)?,
                UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                    self.gen_incdec(e, true)?
                }
            },
            Expr::Cast(e) => {
                tasks.push(Task::Convert { from: e.expr.ty(), to: e.ty.clone() });
                tasks.push(Task::Eval(&e.expr));
            }
            Expr::Conditional(e) => self.gen_conditional(e)?,
            Expr::Assign(e) => self.gen_assign(e, true)?,
            Expr::Invoke(e) => {
                let ins = self.invoke_instr(e)?;
                tasks.push(Task::Emit(ins));
                for arg in e.args.iter().rev() {
                    tasks.push(Task::Eval(arg));
                }
                if let Some(receiver) = &e.receiver {
                    tasks.push(Task::Eval(receiver));
                }
            }
            Expr::New(e) => {
                let class = self.pool.add_class(&e.class)?;
                let ctor = self.pool.add_method_ref(&e.class, "<init>", &e.descriptor)?;
                let (arg_slots, _) = descriptor_slots(&e.descriptor)?;
                tasks.push(Task::Emit(Instr::Invoke {
                    op: opcodes::INVOKESPECIAL,
                    index: ctor,
                    arg_slots: arg_slots + 1,
                    ret_slots: 0,
                }));
                for arg in e.args.iter().rev() {
                    tasks.push(Task::Eval(arg));
                }
                tasks.push(Task::Emit(Instr::Op(opcodes::DUP)));
                tasks.push(Task::Emit(Instr::New { index: class }));
            }
            Expr::NewArray(e) => {
                let ins = match &e.elem {
                    Type::Reference(name) => Instr::ANewArray { index: self.pool.add_class(name)? },
                    prim => Instr::NewArrayPrim { atype: newarray_atype(prim) },
                };
                tasks.push(Task::Emit(ins));
                tasks.push(Task::Eval(&e.length));
            }
        }
        Ok(())
    }

    /// Queue an arithmetic/bitwise/shift binary node.
    fn eval_arith<'e>(&mut self, e: &'e BinaryExpr, tasks: &mut Vec<Task<'e>>) -> Result<()> {
        let is_shift = matches!(e.op, BinaryOp::LShift | BinaryOp::RShift | BinaryOp::URShift);
        let op_ty = e.ty.clone();
        // shift distance stays int regardless of the value operand
        let right_to = if is_shift { Type::Int } else { op_ty.clone() };
        tasks.push(Task::Emit(Instr::Op(binop_opcode(e.op, &op_ty)?)));
        tasks.push(Task::Convert { from: e.right.ty(), to: right_to });
        tasks.push(Task::Eval(&e.right));
        tasks.push(Task::Convert { from: e.left.ty(), to: op_ty });
        tasks.push(Task::Eval(&e.left));
        Ok(())
    }

    /// Lower an expression in statement position, discarding any value.
    pub(crate) fn gen_expr_stmt(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Assign(a) => {
                if let Some(ins) = self.iinc_shortcut(a) {
                    return self.code.emit(ins);
                }
                self.gen_assign(a, false)
            }
            Expr::Unary(u)
                if matches!(
                    u.op,
                    UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec
                ) =>
            {
                if let Expr::Local(l) = u.operand.as_ref() {
                    if l.local.ty == Type::Int {
                        let delta =
                            if matches!(u.op, UnaryOp::PreInc | UnaryOp::PostInc) { 1 } else { -1 };
                        return self.code.emit(Instr::Iinc { slot: l.local.slot, delta });
                    }
                }
                self.gen_incdec(u, false)
            }
            _ => {
                self.gen_expr(expr)?;
                match expr.ty().width() {
                    0 => Ok(()),
                    1 => self.code.emit(Instr::Op(opcodes::POP)),
                    _ => self.code.emit(Instr::Op(opcodes::POP2)),
                }
            }
        }
    }

    /// `i += 3` on an int local folds to iinc.
    fn iinc_shortcut(&self, a: &AssignExpr) -> Option<Instr> {
        let AssignTarget::Local(local) = &a.target else { return None };
        if local.ty != Type::Int {
            return None;
        }
        let sign: i32 = match a.op {
            AssignOp::AddAssign => 1,
            AssignOp::SubAssign => -1,
            _ => return None,
        };
        let Expr::Literal(LiteralExpr { value: Literal::Int(v), .. }) = a.value.as_ref() else {
            return None;
        };
        let delta = v.checked_mul(sign)?;
        if delta >= i16::MIN as i32 && delta <= i16::MAX as i32 {
            Some(Instr::Iinc { slot: local.slot, delta: delta as i16 })
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // assignments
    // ------------------------------------------------------------------

    /// Lower an assignment; with `keep` the assigned value stays on the stack.
    pub(crate) fn gen_assign(&mut self, a: &AssignExpr, keep: bool) -> Result<()> {
        let bop = a.op.binary_op();
        match &a.target {
            AssignTarget::Local(local) => {
                self.check_slot(local)?;
                if let Some(bop) = bop {
                    if local.ty.is_string() && bop == BinaryOp::Add {
                        // s += x  is  s = s + x
                        self.code.emit(Instr::Load { op: load_op(&local.ty), slot: local.slot })?;
                        self.gen_concat_onto_stack(&a.value)?;
                    } else {
                        self.code.emit(Instr::Load { op: load_op(&local.ty), slot: local.slot })?;
                        self.compound_value(&local.ty, bop, &a.value)?;
                    }
                } else {
                    self.gen_expr(&a.value)?;
                    self.emit_convert(&a.value.ty(), &local.ty)?;
                }
                if keep {
                    self.emit_dup(local.ty.width())?;
                }
                self.code.emit(Instr::Store { op: store_op(&local.ty), slot: local.slot })
            }
            AssignTarget::Static(field) => {
                if let Some(bop) = bop {
                    let get = self.static_field(field, false)?;
                    self.code.emit(get)?;
                    if field.ty.is_string() && bop == BinaryOp::Add {
                        self.gen_concat_onto_stack(&a.value)?;
                    } else {
                        self.compound_value(&field.ty, bop, &a.value)?;
                    }
                } else {
                    self.gen_expr(&a.value)?;
                    self.emit_convert(&a.value.ty(), &field.ty)?;
                }
                if keep {
                    self.emit_dup(field.ty.width())?;
                }
                let put = self.static_field(field, true)?;
                self.code.emit(put)
            }
            AssignTarget::Element { array, index, elem } => {
                self.gen_expr(array)?;
                self.gen_expr(index)?;
                if let Some(bop) = bop {
                    self.code.emit(Instr::Op(opcodes::DUP2))?;
                    self.code.emit(Instr::Op(array_load_op(elem)))?;
                    self.compound_value(elem, bop, &a.value)?;
                } else {
                    self.gen_expr(&a.value)?;
                    self.emit_convert(&a.value.ty(), elem)?;
                }
                if keep {
                    // park the value below array and index
                    let dup = if elem.is_wide() { opcodes::DUP2_X2 } else { opcodes::DUP_X2 };
                    self.code.emit(Instr::Op(dup))?;
                }
                self.code.emit(Instr::Op(array_store_op(elem)))
            }
        }
    }

    /// With the old value on the stack: apply `target op= value`, converting
    /// through the promoted operation type and back (`i *= l` computes long).
    fn compound_value(&mut self, target_ty: &Type, bop: BinaryOp, value: &Expr) -> Result<()> {
        let is_shift = matches!(bop, BinaryOp::LShift | BinaryOp::RShift | BinaryOp::URShift);
        let op_ty = if is_shift {
            promote_unary(target_ty)
        } else {
            promote(target_ty, &value.ty())
        };
        self.emit_convert(target_ty, &op_ty)?;
        self.gen_expr(value)?;
        self.emit_convert(&value.ty(), if is_shift { &Type::Int } else { &op_ty })?;
        self.code.emit(Instr::Op(binop_opcode(bop, &op_ty)?))?;
        self.emit_convert(&op_ty, target_ty)
    }

    fn emit_dup(&mut self, width: u16) -> Result<()> {
        let op = if width == 2 { opcodes::DUP2 } else { opcodes::DUP };
        self.code.emit(Instr::Op(op))
    }

    // ------------------------------------------------------------------
    // increment / decrement
    // ------------------------------------------------------------------

    /// Lower `++`/`--`; with `keep`, pre forms leave the new value and post
    /// forms the old one.
    pub(crate) fn gen_incdec(&mut self, u: &UnaryExpr, keep: bool) -> Result<()> {
        let pre = matches!(u.op, UnaryOp::PreInc | UnaryOp::PreDec);
        let inc = matches!(u.op, UnaryOp::PreInc | UnaryOp::PostInc);
        match u.operand.as_ref() {
            Expr::Local(l) if l.local.ty == Type::Int => {
                let delta = if inc { 1 } else { -1 };
                let load = Instr::Load { op: opcodes::ILOAD, slot: l.local.slot };
                if keep && !pre {
                    self.code.emit(load)?;
                    self.code.emit(Instr::Iinc { slot: l.local.slot, delta })?;
                } else {
                    self.code.emit(Instr::Iinc { slot: l.local.slot, delta })?;
                    if keep {
                        self.code.emit(load)?;
                    }
                }
                Ok(())
            }
            Expr::Local(l) => {
                let ty = &l.local.ty;
                let op_ty = promote_unary(ty);
                self.code.emit(Instr::Load { op: load_op(ty), slot: l.local.slot })?;
                if keep && !pre {
                    self.emit_dup(ty.width())?;
                }
                self.emit_convert(ty, &op_ty)?;
                self.emit_one(&op_ty)?;
                self.code.emit(Instr::Op(binop_opcode(
                    if inc { BinaryOp::Add } else { BinaryOp::Sub },
                    &op_ty,
                )?))?;
                self.emit_convert(&op_ty, ty)?;
                if keep && pre {
                    self.emit_dup(ty.width())?;
                }
                self.code.emit(Instr::Store { op: store_op(ty), slot: l.local.slot })
            }
            Expr::StaticGet(g) => {
                let ty = &g.field.ty;
                let op_ty = promote_unary(ty);
                let get = self.static_field(&g.field, false)?;
                self.code.emit(get)?;
                if keep && !pre {
                    self.emit_dup(ty.width())?;
                }
                self.emit_convert(ty, &op_ty)?;
                self.emit_one(&op_ty)?;
                self.code.emit(Instr::Op(binop_opcode(
                    if inc { BinaryOp::Add } else { BinaryOp::Sub },
                    &op_ty,
                )?))?;
                self.emit_convert(&op_ty, ty)?;
                if keep && pre {
                    self.emit_dup(ty.width())?;
                }
                let put = self.static_field(&g.field, true)?;
                self.code.emit(put)
            }
            Expr::ArrayGet(get) => {
                let ty = &get.elem;
                let op_ty = promote_unary(ty);
                self.gen_expr(&get.array)?;
                self.gen_expr(&get.index)?;
                self.code.emit(Instr::Op(opcodes::DUP2))?;
                self.code.emit(Instr::Op(array_load_op(ty)))?;
                if keep && !pre {
                    let dup = if ty.is_wide() { opcodes::DUP2_X2 } else { opcodes::DUP_X2 };
                    self.code.emit(Instr::Op(dup))?;
                }
                self.emit_convert(ty, &op_ty)?;
                self.emit_one(&op_ty)?;
                self.code.emit(Instr::Op(binop_opcode(
                    if inc { BinaryOp::Add } else { BinaryOp::Sub },
                    &op_ty,
                )?))?;
                self.emit_convert(&op_ty, ty)?;
                if keep && pre {
                    let dup = if ty.is_wide() { opcodes::DUP2_X2 } else { opcodes::DUP_X2 };
                    self.code.emit(Instr::Op(dup))?;
                }
                self.code.emit(Instr::Op(array_store_op(ty)))
            }
            other => Err(Error::internal(format!(
                "increment of a non-lvalue: {:?}",
                other.ty()
            ))),
        }
    }

    fn emit_one(&mut self, ty: &Type) -> Result<()> {
        let ins = match ty {
            Type::Long => Instr::Op(opcodes::LCONST_1),
            Type::Float => Instr::Op(opcodes::FCONST_1),
            Type::Double => Instr::Op(opcodes::DCONST_1),
            _ => Instr::Op(opcodes::ICONST_1),
        };
        self.code.emit(ins)
    }

    // ------------------------------------------------------------------
    // conditions
    // ------------------------------------------------------------------

    /// Branch to `target` when `cond` evaluates to `when`, falling through
    /// otherwise. Short-circuit operators chain through intermediate labels.
    pub(crate) fn jump_if(&mut self, cond: &Expr, when: bool, target: Label) -> Result<()> {
        match cond {
            Expr::Literal(LiteralExpr { value: Literal::Bool(b), .. }) => {
                if *b == when {
                    self.code.emit(Instr::Branch { op: opcodes::GOTO, target })?;
                }
                Ok(())
            }
            Expr::Unary(u) if u.op == UnaryOp::Not => self.jump_if(&u.operand, !when, target),
            Expr::Binary(b) if b.op == BinaryOp::AndAnd => {
                if when {
                    let fall = self.code.define_label();
                    self.jump_if(&b.left, false, fall)?;
                    self.jump_if(&b.right, true, target)?;
                    self.code.bind(fall)
                } else {
                    self.jump_if(&b.left, false, target)?;
                    self.jump_if(&b.right, false, target)
                }
            }
            Expr::Binary(b) if b.op == BinaryOp::OrOr => {
                if when {
                    self.jump_if(&b.left, true, target)?;
                    self.jump_if(&b.right, true, target)
                } else {
                    let fall = self.code.define_label();
                    self.jump_if(&b.left, true, fall)?;
                    self.jump_if(&b.right, false, target)?;
                    self.code.bind(fall)
                }
            }
            Expr::Binary(b) if b.op.is_comparison() => self.jump_cmp(b, when, target),
            _ => {
                self.gen_expr(cond)?;
                let op = if when { opcodes::IFNE } else { opcodes::IFEQ };
                self.code.emit(Instr::Branch { op, target })
            }
        }
    }

    fn jump_cmp(&mut self, b: &BinaryExpr, when: bool, target: Label) -> Result<()> {
        let lt = b.left.ty();
        let rt = b.right.ty();

        if lt.is_reference() || rt.is_reference() {
            // only == and != compare references
            let null_left = matches!(b.left.as_ref(), Expr::Literal(LiteralExpr { value: Literal::Null, .. }));
            let null_right = matches!(b.right.as_ref(), Expr::Literal(LiteralExpr { value: Literal::Null, .. }));
            let base = if null_left || null_right {
                self.gen_expr(if null_left { &b.right } else { &b.left })?;
                match b.op {
                    BinaryOp::Eq => opcodes::IFNULL,
                    _ => opcodes::IFNONNULL,
                }
            } else {
                self.gen_expr(&b.left)?;
                self.gen_expr(&b.right)?;
                match b.op {
                    BinaryOp::Eq => opcodes::IF_ACMPEQ,
                    _ => opcodes::IF_ACMPNE,
                }
            };
            let op = if when { base } else { opcodes::negate(base) };
            return self.code.emit(Instr::Branch { op, target });
        }

        let op_ty = promote(&lt, &rt);
        if op_ty == Type::Int {
            // compare-to-zero collapses to the single-operand family
            let zero_right = matches!(
                b.right.as_ref(),
                Expr::Literal(LiteralExpr { value: Literal::Int(0), .. })
            );
            let base = if zero_right {
                self.gen_expr(&b.left)?;
                if_opcode(b.op)
            } else {
                self.gen_expr(&b.left)?;
                self.gen_expr(&b.right)?;
                icmp_opcode(b.op)
            };
            let op = if when { base } else { opcodes::negate(base) };
            return self.code.emit(Instr::Branch { op, target });
        }

        // long/float/double compare via xcmp followed by ifXX
        self.gen_expr(&b.left)?;
        self.emit_convert(&lt, &op_ty)?;
        self.gen_expr(&b.right)?;
        self.emit_convert(&rt, &op_ty)?;
        let cmp = match &op_ty {
            Type::Long => opcodes::LCMP,
            // NaN falls toward "false" on the less-than side
            Type::Float => match b.op {
                BinaryOp::Lt | BinaryOp::Le => opcodes::FCMPG,
                _ => opcodes::FCMPL,
            },
            Type::Double => match b.op {
                BinaryOp::Lt | BinaryOp::Le => opcodes::DCMPG,
                _ => opcodes::DCMPL,
            },
            _ => return Err(Error::internal("comparison promotion")),
        };
        self.code.emit(Instr::Op(cmp))?;
        let base = if_opcode(b.op);
        let op = if when { base } else { opcodes::negate(base) };
        self.code.emit(Instr::Branch { op, target })
    }

    /// Materialize a condition as 0/1.
    pub(crate) fn gen_cond_value(&mut self, cond: &Expr) -> Result<()> {
        let when_false = self.code.define_label();
        let end = self.code.define_label();
        self.jump_if(cond, false, when_false)?;
        self.code.emit(Instr::Op(opcodes::ICONST_1))?;
        self.code.emit(Instr::Branch { op: opcodes::GOTO, target: end })?;
        self.code.bind(when_false)?;
        self.code.emit(Instr::Op(opcodes::ICONST_0))?;
        self.code.bind(end)
    }

    fn gen_conditional(&mut self, e: &ConditionalExpr) -> Result<()> {
        let when_false = self.code.define_label();
        let end = self.code.define_label();
        self.jump_if(&e.condition, false, when_false)?;
        self.gen_expr(&e.then_expr)?;
        self.emit_convert(&e.then_expr.ty(), &e.ty)?;
        self.code.emit(Instr::Branch { op: opcodes::GOTO, target: end })?;
        self.code.bind(when_false)?;
        self.gen_expr(&e.else_expr)?;
        self.emit_convert(&e.else_expr.ty(), &e.ty)?;
        self.code.bind(end)
    }

    // ------------------------------------------------------------------
    // constants, conversions, shared pieces
    // ------------------------------------------------------------------

    pub(crate) fn gen_literal(&mut self, lit: &Literal) -> Result<()> {
        let ins = match lit {
            Literal::Int(v) => self.int_const(*v)?,
            Literal::Bool(b) => Instr::Op(if *b { opcodes::ICONST_1 } else { opcodes::ICONST_0 }),
            Literal::Char(c) => self.int_const(*c as i32)?,
            Literal::Long(v) => match v {
                0 => Instr::Op(opcodes::LCONST_0),
                1 => Instr::Op(opcodes::LCONST_1),
                _ => Instr::Ldc2(self.pool.add_long(*v)?),
            },
            Literal::Float(v) => {
                if *v == 0.0 && v.is_sign_positive() {
                    Instr::Op(opcodes::FCONST_0)
                } else if *v == 1.0 {
                    Instr::Op(opcodes::FCONST_1)
                } else if *v == 2.0 {
                    Instr::Op(opcodes::FCONST_2)
                } else {
                    Instr::Ldc(self.pool.add_float(*v)?)
                }
            }
            Literal::Double(v) => {
                if *v == 0.0 && v.is_sign_positive() {
                    Instr::Op(opcodes::DCONST_0)
                } else if *v == 1.0 {
                    Instr::Op(opcodes::DCONST_1)
                } else {
                    Instr::Ldc2(self.pool.add_double(*v)?)
                }
            }
            Literal::Str(s) => Instr::Ldc(self.pool.add_string(s)?),
            Literal::Null => Instr::Op(opcodes::ACONST_NULL),
        };
        self.code.emit(ins)
    }

    fn int_const(&mut self, v: i32) -> Result<Instr> {
        Ok(match v {
            -1..=5 => Instr::Op((opcodes::ICONST_0 as i32 + v) as u8),
            _ if v >= i8::MIN as i32 && v <= i8::MAX as i32 => Instr::Bipush(v as i8),
            _ if v >= i16::MIN as i32 && v <= i16::MAX as i32 => Instr::Sipush(v as i16),
            _ => Instr::Ldc(self.pool.add_integer(v)?),
        })
    }

    /// Emit the conversion sequence from `from` to `to`, if any.
    pub(crate) fn emit_convert(&mut self, from: &Type, to: &Type) -> Result<()> {
        if from == to {
            return Ok(());
        }
        match (from.is_reference(), to.is_reference()) {
            (true, true) => {
                let index = match to {
                    Type::Reference(name) => self.pool.add_class(name)?,
                    _ => unreachable!(),
                };
                return self.code.emit(Instr::Checkcast { index });
            }
            (false, false) => {}
            _ => {
                return Err(Error::internal(format!(
                    "no conversion from {:?} to {:?}",
                    from, to
                )))
            }
        }

        if from.is_int_like() && to.is_int_like() {
            let narrow = match to {
                Type::Byte if *from != Type::Byte => Some(opcodes::I2B),
                Type::Char if *from != Type::Char => Some(opcodes::I2C),
                Type::Short if matches!(from, Type::Int | Type::Char) => Some(opcodes::I2S),
                _ => None,
            };
            if let Some(op) = narrow {
                self.code.emit(Instr::Op(op))?;
            }
            return Ok(());
        }

        let hub = |ty: &Type| if ty.is_int_like() { Type::Int } else { ty.clone() };
        let (from_hub, to_hub) = (hub(from), hub(to));
        if from_hub != to_hub {
            let op = match (&from_hub, &to_hub) {
                (Type::Int, Type::Long) => opcodes::I2L,
                (Type::Int, Type::Float) => opcodes::I2F,
                (Type::Int, Type::Double) => opcodes::I2D,
                (Type::Long, Type::Int) => opcodes::L2I,
                (Type::Long, Type::Float) => opcodes::L2F,
                (Type::Long, Type::Double) => opcodes::L2D,
                (Type::Float, Type::Int) => opcodes::F2I,
                (Type::Float, Type::Long) => opcodes::F2L,
                (Type::Float, Type::Double) => opcodes::F2D,
                (Type::Double, Type::Int) => opcodes::D2I,
                (Type::Double, Type::Long) => opcodes::D2L,
                (Type::Double, Type::Float) => opcodes::D2F,
                _ => {
                    return Err(Error::internal(format!(
                        "no conversion from {:?} to {:?}",
                        from, to
                    )))
                }
            };
            self.code.emit(Instr::Op(op))?;
        }
        match to {
            Type::Byte => self.code.emit(Instr::Op(opcodes::I2B)),
            Type::Char => self.code.emit(Instr::Op(opcodes::I2C)),
            Type::Short => self.code.emit(Instr::Op(opcodes::I2S)),
            _ => Ok(()),
        }
    }

    fn invoke_instr(&mut self, e: &InvokeExpr) -> Result<Instr> {
        let (arg_slots, ret_slots) = descriptor_slots(&e.descriptor)?;
        let index = self.pool.add_method_ref(&e.owner, &e.name, &e.descriptor)?;
        let (op, arg_slots) = match e.kind {
            InvokeKind::Static => (opcodes::INVOKESTATIC, arg_slots),
            InvokeKind::Virtual => (opcodes::INVOKEVIRTUAL, arg_slots + 1),
            InvokeKind::Special => (opcodes::INVOKESPECIAL, arg_slots + 1),
        };
        Ok(Instr::Invoke { op, index, arg_slots, ret_slots })
    }

    fn static_field(&mut self, field: &FieldRef, put: bool) -> Result<Instr> {
        let index = self.pool.add_field_ref(&field.owner, &field.name, &field.ty.descriptor())?;
        let width = field.ty.width();
        Ok(if put {
            Instr::PutStatic { index, width }
        } else {
            Instr::GetStatic { index, width }
        })
    }

    fn check_slot(&self, local: &LocalRef) -> Result<()> {
        let top = local.slot as u32 + local.ty.width() as u32;
        if top > self.code.max_locals as u32 {
            return Err(Error::BadLocalSlot {
                slot: local.slot as u32,
                max_locals: self.code.max_locals as u32,
            });
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------
// opcode selection tables
// ----------------------------------------------------------------------

pub(crate) fn load_op(ty: &Type) -> u8 {
    match ty {
        Type::Long => opcodes::LLOAD,
        Type::Float => opcodes::FLOAD,
        Type::Double => opcodes::DLOAD,
        Type::Reference(_) => opcodes::ALOAD,
        _ => opcodes::ILOAD,
    }
}

pub(crate) fn store_op(ty: &Type) -> u8 {
    match ty {
        Type::Long => opcodes::LSTORE,
        Type::Float => opcodes::FSTORE,
        Type::Double => opcodes::DSTORE,
        Type::Reference(_) => opcodes::ASTORE,
        _ => opcodes::ISTORE,
    }
}

pub(crate) fn array_load_op(elem: &Type) -> u8 {
    match elem {
        Type::Boolean | Type::Byte => opcodes::BALOAD,
        Type::Char => opcodes::CALOAD,
        Type::Short => opcodes::SALOAD,
        Type::Long => opcodes::LALOAD,
        Type::Float => opcodes::FALOAD,
        Type::Double => opcodes::DALOAD,
        Type::Reference(_) => opcodes::AALOAD,
        _ => opcodes::IALOAD,
    }
}

pub(crate) fn array_store_op(elem: &Type) -> u8 {
    match elem {
        Type::Boolean | Type::Byte => opcodes::BASTORE,
        Type::Char => opcodes::CASTORE,
        Type::Short => opcodes::SASTORE,
        Type::Long => opcodes::LASTORE,
        Type::Float => opcodes::FASTORE,
        Type::Double => opcodes::DASTORE,
        Type::Reference(_) => opcodes::AASTORE,
        _ => opcodes::IASTORE,
    }
}

pub(crate) fn return_op(ty: &Type) -> u8 {
    match ty {
        Type::Void => opcodes::RETURN,
        Type::Long => opcodes::LRETURN,
        Type::Float => opcodes::FRETURN,
        Type::Double => opcodes::DRETURN,
        Type::Reference(_) => opcodes::ARETURN,
        _ => opcodes::IRETURN,
    }
}

fn neg_op(ty: &Type) -> u8 {
    match ty {
        Type::Long => opcodes::LNEG,
        Type::Float => opcodes::FNEG,
        Type::Double => opcodes::DNEG,
        _ => opcodes::INEG,
    }
}

fn newarray_atype(ty: &Type) -> u8 {
    match ty {
        Type::Boolean => 4,
        Type::Char => 5,
        Type::Float => 6,
        Type::Double => 7,
        Type::Byte => 8,
        Type::Short => 9,
        Type::Long => 11,
        _ => 10, // int
    }
}

/// Binary numeric promotion.
pub(crate) fn promote(a: &Type, b: &Type) -> Type {
    if *a == Type::Double || *b == Type::Double {
        Type::Double
    } else if *a == Type::Float || *b == Type::Float {
        Type::Float
    } else if *a == Type::Long || *b == Type::Long {
        Type::Long
    } else {
        Type::Int
    }
}

/// Unary numeric promotion.
pub(crate) fn promote_unary(ty: &Type) -> Type {
    if ty.is_int_like() {
        Type::Int
    } else {
        ty.clone()
    }
}

pub(crate) fn binop_opcode(op: BinaryOp, ty: &Type) -> Result<u8> {
    use opcodes::*;
    let hub = promote_unary(ty);
    let table: [u8; 4] = match op {
        BinaryOp::Add => [IADD, LADD, FADD, DADD],
        BinaryOp::Sub => [ISUB, LSUB, FSUB, DSUB],
        BinaryOp::Mul => [IMUL, LMUL, FMUL, DMUL],
        BinaryOp::Div => [IDIV, LDIV, FDIV, DDIV],
        BinaryOp::Mod => [IREM, LREM, FREM, DREM],
        BinaryOp::And => [IAND, LAND, 0, 0],
        BinaryOp::Or => [IOR, LOR, 0, 0],
        BinaryOp::Xor => [IXOR, LXOR, 0, 0],
        BinaryOp::LShift => [ISHL, LSHL, 0, 0],
        BinaryOp::RShift => [ISHR, LSHR, 0, 0],
        BinaryOp::URShift => [IUSHR, LUSHR, 0, 0],
        _ => return Err(Error::internal(format!("not an arithmetic operator: {:?}", op))),
    };
    let selected = match hub {
        Type::Int => table[0],
        Type::Long => table[1],
        Type::Float => table[2],
        Type::Double => table[3],
        _ => 0,
    };
    if selected == 0 {
        return Err(Error::internal(format!("operator {:?} undefined for {:?}", op, ty)));
    }
    Ok(selected)
}

fn if_opcode(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Lt => opcodes::IFLT,
        BinaryOp::Le => opcodes::IFLE,
        BinaryOp::Gt => opcodes::IFGT,
        BinaryOp::Ge => opcodes::IFGE,
        BinaryOp::Eq => opcodes::IFEQ,
        _ => opcodes::IFNE,
    }
}

fn icmp_opcode(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Lt => opcodes::IF_ICMPLT,
        BinaryOp::Le => opcodes::IF_ICMPLE,
        BinaryOp::Gt => opcodes::IF_ICMPGT,
        BinaryOp::Ge => opcodes::IF_ICMPGE,
        BinaryOp::Eq => opcodes::IF_ICMPEQ,
        _ => opcodes::IF_ICMPNE,
    }
}
