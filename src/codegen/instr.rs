//! Tagged instruction representation.
//!
//! Lowering components build `Instr` values; the code buffer matches them
//! exhaustively to encode bytes and to account stack effects. Branch and
//! switch variants reference abstract labels that the buffer patches once
//! bound.

use super::code::Label;
use super::opcodes;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Single-byte instruction with a fixed stack effect
    Op(u8),
    Bipush(i8),
    Sipush(i16),
    /// Load of a one-slot constant; widens to ldc_w for pool indexes > 255
    Ldc(u16),
    /// Load of a long/double constant (always ldc2_w)
    Ldc2(u16),
    /// iload/lload/fload/dload/aload with `_n`, short or wide form by slot
    Load { op: u8, slot: u16 },
    Store { op: u8, slot: u16 },
    Iinc { slot: u16, delta: i16 },
    GetStatic { index: u16, width: u16 },
    PutStatic { index: u16, width: u16 },
    /// invokevirtual/invokespecial/invokestatic; `arg_slots` includes the
    /// receiver for instance calls
    Invoke { op: u8, index: u16, arg_slots: u16, ret_slots: u16 },
    /// invokedynamic call site
    Indy { index: u16, arg_slots: u16, ret_slots: u16 },
    New { index: u16 },
    /// newarray with a primitive array-type code
    NewArrayPrim { atype: u8 },
    ANewArray { index: u16 },
    Checkcast { index: u16 },
    /// Conditional branch or goto to a label
    Branch { op: u8, target: Label },
    TableSwitch {
        default: Label,
        low: i32,
        high: i32,
        targets: Vec<Label>,
    },
    LookupSwitch {
        default: Label,
        pairs: Vec<(i32, Label)>,
    },
}

impl Instr {
    /// Encoded length in bytes when appended at `pc`.
    ///
    /// Switch padding depends on the opcode position and branch width depends
    /// on fat mode, so the buffer asks per emission site.
    pub fn encoded_len(&self, pc: usize, fatcode: bool) -> usize {
        match self {
            Instr::Op(_) => 1,
            Instr::Bipush(_) => 2,
            Instr::Sipush(_) => 3,
            Instr::Ldc(index) => if *index > 0xff { 3 } else { 2 },
            Instr::Ldc2(_) => 3,
            Instr::Load { slot, .. } | Instr::Store { slot, .. } => {
                if *slot <= 3 {
                    1
                } else if *slot <= 0xff {
                    2
                } else {
                    4 // wide form
                }
            }
            Instr::Iinc { slot, delta } => {
                if *slot > 0xff || *delta > i8::MAX as i16 || *delta < i8::MIN as i16 {
                    6 // wide form
                } else {
                    3
                }
            }
            Instr::GetStatic { .. } | Instr::PutStatic { .. } => 3,
            Instr::NewArrayPrim { .. } => 2,
            Instr::Invoke { .. } => 3,
            Instr::Indy { .. } => 5,
            Instr::New { .. } | Instr::ANewArray { .. } | Instr::Checkcast { .. } => 3,
            Instr::Branch { op, .. } => {
                if !fatcode {
                    3
                } else if *op == opcodes::GOTO {
                    5
                } else {
                    8 // negated condition + goto_w
                }
            }
            Instr::TableSwitch { targets, .. } => {
                1 + switch_pad(pc) + 12 + 4 * targets.len()
            }
            Instr::LookupSwitch { pairs, .. } => {
                1 + switch_pad(pc) + 8 + 8 * pairs.len()
            }
        }
    }

    /// Operand stack effect as (pops, pushes), applied in that order.
    pub fn stack_effect(&self) -> (u32, u32) {
        match self {
            Instr::Op(op) => op_stack_effect(*op),
            Instr::Bipush(_) | Instr::Sipush(_) | Instr::Ldc(_) => (0, 1),
            Instr::Ldc2(_) => (0, 2),
            Instr::Load { op, .. } => match *op {
                opcodes::LLOAD | opcodes::DLOAD => (0, 2),
                _ => (0, 1),
            },
            Instr::Store { op, .. } => match *op {
                opcodes::LSTORE | opcodes::DSTORE => (2, 0),
                _ => (1, 0),
            },
            Instr::Iinc { .. } => (0, 0),
            Instr::GetStatic { width, .. } => (0, *width as u32),
            Instr::PutStatic { width, .. } => (*width as u32, 0),
            Instr::Invoke { arg_slots, ret_slots, .. }
            | Instr::Indy { arg_slots, ret_slots, .. } => (*arg_slots as u32, *ret_slots as u32),
            Instr::New { .. } => (0, 1),
            Instr::NewArrayPrim { .. } => (1, 1),
            Instr::ANewArray { .. } => (1, 1),
            Instr::Checkcast { .. } => (1, 1),
            Instr::Branch { op, .. } => branch_stack_effect(*op),
            Instr::TableSwitch { .. } | Instr::LookupSwitch { .. } => (1, 0),
        }
    }

    /// Instructions after which code is dead until the next bound label.
    pub fn is_terminal(&self) -> bool {
        match self {
            Instr::Op(op) => matches!(
                *op,
                opcodes::RETURN
                    | opcodes::IRETURN
                    | opcodes::LRETURN
                    | opcodes::FRETURN
                    | opcodes::DRETURN
                    | opcodes::ARETURN
                    | opcodes::ATHROW
            ),
            Instr::Branch { op, .. } => *op == opcodes::GOTO,
            // Switches transfer control unconditionally
            Instr::TableSwitch { .. } | Instr::LookupSwitch { .. } => true,
            _ => false,
        }
    }
}

/// Padding bytes between a switch opcode at `pc` and its 4-byte-aligned body.
pub fn switch_pad(pc: usize) -> usize {
    (4 - ((pc + 1) % 4)) % 4
}

fn branch_stack_effect(op: u8) -> (u32, u32) {
    match op {
        opcodes::GOTO => (0, 0),
        opcodes::IF_ICMPEQ..=opcodes::IF_ACMPNE => (2, 0),
        // ifeq..ifle, ifnull, ifnonnull
        _ => (1, 0),
    }
}

fn op_stack_effect(op: u8) -> (u32, u32) {
    use opcodes::*;
    match op {
        NOP => (0, 0),
        ACONST_NULL | ICONST_M1..=ICONST_5 | FCONST_0..=FCONST_2 => (0, 1),
        LCONST_0 | LCONST_1 | DCONST_0 | DCONST_1 => (0, 2),

        IALOAD | FALOAD | AALOAD | BALOAD | CALOAD | SALOAD => (2, 1),
        LALOAD | DALOAD => (2, 2),
        IASTORE | FASTORE | AASTORE | BASTORE | CASTORE | SASTORE => (3, 0),
        LASTORE | DASTORE => (4, 0),

        POP => (1, 0),
        POP2 => (2, 0),
        DUP => (1, 2),
        DUP_X1 => (2, 3),
        DUP_X2 => (3, 4),
        DUP2 => (2, 4),
        DUP2_X1 => (3, 5),
        DUP2_X2 => (4, 6),
        SWAP => (2, 2),

        IADD | ISUB | IMUL | IDIV | IREM | IAND | IOR | IXOR
        | FADD | FSUB | FMUL | FDIV | FREM
        | ISHL | ISHR | IUSHR => (2, 1),
        LADD | LSUB | LMUL | LDIV | LREM | LAND | LOR | LXOR
        | DADD | DSUB | DMUL | DDIV | DREM => (4, 2),
        // shift amount is an int even for long shifts
        LSHL | LSHR | LUSHR => (3, 2),
        INEG | FNEG => (1, 1),
        LNEG | DNEG => (2, 2),

        I2F | F2I | I2B | I2C | I2S => (1, 1),
        I2L | I2D | F2L | F2D => (1, 2),
        L2I | L2F | D2I | D2F => (2, 1),
        L2D | D2L => (2, 2),

        LCMP | DCMPL | DCMPG => (4, 1),
        FCMPL | FCMPG => (2, 1),

        IRETURN | FRETURN | ARETURN | ATHROW => (1, 0),
        LRETURN | DRETURN => (2, 0),
        RETURN => (0, 0),
        ARRAYLENGTH => (1, 1),

        _ => (0, 0),
    }
}

/// Parse a method descriptor into (argument slots, return slots).
pub fn descriptor_slots(descriptor: &str) -> Result<(u16, u16)> {
    let bad = || Error::BadDescriptor { descriptor: descriptor.to_string() };
    let inner = descriptor.strip_prefix('(').ok_or_else(bad)?;
    let close = inner.find(')').ok_or_else(bad)?;
    let (params, ret) = (&inner[..close], &inner[close + 1..]);

    let mut args: u16 = 0;
    let mut chars = params.chars();
    while let Some(c) = chars.next() {
        match c {
            'J' | 'D' => args += 2,
            'B' | 'C' | 'F' | 'I' | 'S' | 'Z' => args += 1,
            'L' => {
                args += 1;
                if !chars.by_ref().any(|c| c == ';') {
                    return Err(bad());
                }
            }
            '[' => {
                args += 1;
                // skip remaining array dimensions plus the element type
                let mut c = chars.next().ok_or_else(bad)?;
                while c == '[' {
                    c = chars.next().ok_or_else(bad)?;
                }
                if c == 'L' && !chars.by_ref().any(|c| c == ';') {
                    return Err(bad());
                }
            }
            _ => return Err(bad()),
        }
    }

    let ret_slots = match ret.chars().next().ok_or_else(bad)? {
        'V' => 0,
        'J' | 'D' => 2,
        _ => 1,
    };
    Ok((args, ret_slots))
}
