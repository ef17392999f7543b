//! JVM instruction opcodes used by the method-body generator.
//!
//! Values follow the Java Virtual Machine Specification, ordered by opcode.

pub const NOP: u8 = 0x00;
pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_M1: u8 = 0x02;
pub const ICONST_0: u8 = 0x03;
pub const ICONST_1: u8 = 0x04;
pub const ICONST_2: u8 = 0x05;
pub const ICONST_3: u8 = 0x06;
pub const ICONST_4: u8 = 0x07;
pub const ICONST_5: u8 = 0x08;
pub const LCONST_0: u8 = 0x09;
pub const LCONST_1: u8 = 0x0a;
pub const FCONST_0: u8 = 0x0b;
pub const FCONST_1: u8 = 0x0c;
pub const FCONST_2: u8 = 0x0d;
pub const DCONST_0: u8 = 0x0e;
pub const DCONST_1: u8 = 0x0f;
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;

pub const ILOAD: u8 = 0x15;
pub const LLOAD: u8 = 0x16;
pub const FLOAD: u8 = 0x17;
pub const DLOAD: u8 = 0x18;
pub const ALOAD: u8 = 0x19;
pub const ILOAD_0: u8 = 0x1a;
pub const LLOAD_0: u8 = 0x1e;
pub const FLOAD_0: u8 = 0x22;
pub const DLOAD_0: u8 = 0x26;
pub const ALOAD_0: u8 = 0x2a;

pub const IALOAD: u8 = 0x2e;
pub const LALOAD: u8 = 0x2f;
pub const FALOAD: u8 = 0x30;
pub const DALOAD: u8 = 0x31;
pub const AALOAD: u8 = 0x32;
pub const BALOAD: u8 = 0x33;
pub const CALOAD: u8 = 0x34;
pub const SALOAD: u8 = 0x35;

pub const ISTORE: u8 = 0x36;
pub const LSTORE: u8 = 0x37;
pub const FSTORE: u8 = 0x38;
pub const DSTORE: u8 = 0x39;
pub const ASTORE: u8 = 0x3a;
pub const ISTORE_0: u8 = 0x3b;
pub const LSTORE_0: u8 = 0x3f;
pub const FSTORE_0: u8 = 0x43;
pub const DSTORE_0: u8 = 0x47;
pub const ASTORE_0: u8 = 0x4b;

pub const IASTORE: u8 = 0x4f;
pub const LASTORE: u8 = 0x50;
pub const FASTORE: u8 = 0x51;
pub const DASTORE: u8 = 0x52;
pub const AASTORE: u8 = 0x53;
pub const BASTORE: u8 = 0x54;
pub const CASTORE: u8 = 0x55;
pub const SASTORE: u8 = 0x56;

pub const POP: u8 = 0x57;
pub const POP2: u8 = 0x58;
pub const DUP: u8 = 0x59;
pub const DUP_X1: u8 = 0x5a;
pub const DUP_X2: u8 = 0x5b;
pub const DUP2: u8 = 0x5c;
pub const DUP2_X1: u8 = 0x5d;
pub const DUP2_X2: u8 = 0x5e;
pub const SWAP: u8 = 0x5f;

pub const IADD: u8 = 0x60;
pub const LADD: u8 = 0x61;
pub const FADD: u8 = 0x62;
pub const DADD: u8 = 0x63;
pub const ISUB: u8 = 0x64;
pub const LSUB: u8 = 0x65;
pub const FSUB: u8 = 0x66;
pub const DSUB: u8 = 0x67;
pub const IMUL: u8 = 0x68;
pub const LMUL: u8 = 0x69;
pub const FMUL: u8 = 0x6a;
pub const DMUL: u8 = 0x6b;
pub const IDIV: u8 = 0x6c;
pub const LDIV: u8 = 0x6d;
pub const FDIV: u8 = 0x6e;
pub const DDIV: u8 = 0x6f;
pub const IREM: u8 = 0x70;
pub const LREM: u8 = 0x71;
pub const FREM: u8 = 0x72;
pub const DREM: u8 = 0x73;
pub const INEG: u8 = 0x74;
pub const LNEG: u8 = 0x75;
pub const FNEG: u8 = 0x76;
pub const DNEG: u8 = 0x77;
pub const ISHL: u8 = 0x78;
pub const LSHL: u8 = 0x79;
pub const ISHR: u8 = 0x7a;
pub const LSHR: u8 = 0x7b;
pub const IUSHR: u8 = 0x7c;
pub const LUSHR: u8 = 0x7d;
pub const IAND: u8 = 0x7e;
pub const LAND: u8 = 0x7f;
pub const IOR: u8 = 0x80;
pub const LOR: u8 = 0x81;
pub const IXOR: u8 = 0x82;
pub const LXOR: u8 = 0x83;
pub const IINC: u8 = 0x84;

pub const I2L: u8 = 0x85;
pub const I2F: u8 = 0x86;
pub const I2D: u8 = 0x87;
pub const L2I: u8 = 0x88;
pub const L2F: u8 = 0x89;
pub const L2D: u8 = 0x8a;
pub const F2I: u8 = 0x8b;
pub const F2L: u8 = 0x8c;
pub const F2D: u8 = 0x8d;
pub const D2I: u8 = 0x8e;
pub const D2L: u8 = 0x8f;
pub const D2F: u8 = 0x90;
pub const I2B: u8 = 0x91;
pub const I2C: u8 = 0x92;
pub const I2S: u8 = 0x93;

pub const LCMP: u8 = 0x94;
pub const FCMPL: u8 = 0x95;
pub const FCMPG: u8 = 0x96;
pub const DCMPL: u8 = 0x97;
pub const DCMPG: u8 = 0x98;

pub const IFEQ: u8 = 0x99;
pub const IFNE: u8 = 0x9a;
pub const IFLT: u8 = 0x9b;
pub const IFGE: u8 = 0x9c;
pub const IFGT: u8 = 0x9d;
pub const IFLE: u8 = 0x9e;
pub const IF_ICMPEQ: u8 = 0x9f;
pub const IF_ICMPNE: u8 = 0xa0;
pub const IF_ICMPLT: u8 = 0xa1;
pub const IF_ICMPGE: u8 = 0xa2;
pub const IF_ICMPGT: u8 = 0xa3;
pub const IF_ICMPLE: u8 = 0xa4;
pub const IF_ACMPEQ: u8 = 0xa5;
pub const IF_ACMPNE: u8 = 0xa6;
pub const GOTO: u8 = 0xa7;

pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;
pub const IRETURN: u8 = 0xac;
pub const LRETURN: u8 = 0xad;
pub const FRETURN: u8 = 0xae;
pub const DRETURN: u8 = 0xaf;
pub const ARETURN: u8 = 0xb0;
pub const RETURN: u8 = 0xb1;

pub const GETSTATIC: u8 = 0xb2;
pub const PUTSTATIC: u8 = 0xb3;
pub const GETFIELD: u8 = 0xb4;
pub const PUTFIELD: u8 = 0xb5;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
pub const INVOKEINTERFACE: u8 = 0xb9;
pub const INVOKEDYNAMIC: u8 = 0xba;
pub const NEW: u8 = 0xbb;
pub const NEWARRAY: u8 = 0xbc;
pub const ANEWARRAY: u8 = 0xbd;
pub const ARRAYLENGTH: u8 = 0xbe;
pub const ATHROW: u8 = 0xbf;
pub const CHECKCAST: u8 = 0xc0;
pub const INSTANCEOF: u8 = 0xc1;

pub const WIDE: u8 = 0xc4;
pub const IFNULL: u8 = 0xc6;
pub const IFNONNULL: u8 = 0xc7;
pub const GOTO_W: u8 = 0xc8;

/// Invert a conditional branch opcode (javac negate).
pub fn negate(op: u8) -> u8 {
    match op {
        IFNULL => IFNONNULL,
        IFNONNULL => IFNULL,
        // ifeq..if_acmpne pair up as even/odd neighbours
        _ => ((op as i16 - 1) ^ 1) as u8 + 1,
    }
}

/// Mnemonic for debug traces. Unknown opcodes print as `?`.
pub fn mnemonic(op: u8) -> &'static str {
    use once_cell::sync::Lazy;
    static NAMES: Lazy<Vec<&'static str>> = Lazy::new(|| {
        let mut names = vec!["?"; 256];
        for &(op, name) in &[
            (NOP, "nop"), (ACONST_NULL, "aconst_null"), (ICONST_M1, "iconst_m1"),
            (ICONST_0, "iconst_0"), (ICONST_1, "iconst_1"), (ICONST_2, "iconst_2"),
            (ICONST_3, "iconst_3"), (ICONST_4, "iconst_4"), (ICONST_5, "iconst_5"),
            (LCONST_0, "lconst_0"), (LCONST_1, "lconst_1"), (FCONST_0, "fconst_0"),
            (FCONST_1, "fconst_1"), (FCONST_2, "fconst_2"), (DCONST_0, "dconst_0"),
            (DCONST_1, "dconst_1"), (BIPUSH, "bipush"), (SIPUSH, "sipush"),
            (LDC, "ldc"), (LDC_W, "ldc_w"), (LDC2_W, "ldc2_w"),
            (ILOAD, "iload"), (LLOAD, "lload"), (FLOAD, "fload"), (DLOAD, "dload"),
            (ALOAD, "aload"), (IALOAD, "iaload"), (AALOAD, "aaload"),
            (ISTORE, "istore"), (LSTORE, "lstore"), (FSTORE, "fstore"),
            (DSTORE, "dstore"), (ASTORE, "astore"), (IASTORE, "iastore"),
            (AASTORE, "aastore"), (POP, "pop"), (POP2, "pop2"), (DUP, "dup"),
            (DUP_X1, "dup_x1"), (DUP2, "dup2"), (SWAP, "swap"),
            (IADD, "iadd"), (LADD, "ladd"), (FADD, "fadd"), (DADD, "dadd"),
            (ISUB, "isub"), (LSUB, "lsub"), (IMUL, "imul"), (LMUL, "lmul"),
            (IDIV, "idiv"), (IREM, "irem"), (INEG, "ineg"), (LNEG, "lneg"),
            (ISHL, "ishl"), (ISHR, "ishr"), (IUSHR, "iushr"),
            (IAND, "iand"), (IOR, "ior"), (IXOR, "ixor"), (IINC, "iinc"),
            (I2L, "i2l"), (I2F, "i2f"), (I2D, "i2d"), (L2I, "l2i"),
            (F2I, "f2i"), (D2I, "d2i"), (I2B, "i2b"), (I2C, "i2c"), (I2S, "i2s"),
            (LCMP, "lcmp"), (FCMPL, "fcmpl"), (FCMPG, "fcmpg"),
            (DCMPL, "dcmpl"), (DCMPG, "dcmpg"),
            (IFEQ, "ifeq"), (IFNE, "ifne"), (IFLT, "iflt"), (IFGE, "ifge"),
            (IFGT, "ifgt"), (IFLE, "ifle"),
            (IF_ICMPEQ, "if_icmpeq"), (IF_ICMPNE, "if_icmpne"),
            (IF_ICMPLT, "if_icmplt"), (IF_ICMPGE, "if_icmpge"),
            (IF_ICMPGT, "if_icmpgt"), (IF_ICMPLE, "if_icmple"),
            (IF_ACMPEQ, "if_acmpeq"), (IF_ACMPNE, "if_acmpne"),
            (GOTO, "goto"), (TABLESWITCH, "tableswitch"),
            (LOOKUPSWITCH, "lookupswitch"),
            (IRETURN, "ireturn"), (LRETURN, "lreturn"), (FRETURN, "freturn"),
            (DRETURN, "dreturn"), (ARETURN, "areturn"), (RETURN, "return"),
            (GETSTATIC, "getstatic"), (PUTSTATIC, "putstatic"),
            (INVOKEVIRTUAL, "invokevirtual"), (INVOKESPECIAL, "invokespecial"),
            (INVOKESTATIC, "invokestatic"), (INVOKEINTERFACE, "invokeinterface"),
            (INVOKEDYNAMIC, "invokedynamic"), (NEW, "new"), (NEWARRAY, "newarray"),
            (ANEWARRAY, "anewarray"), (ARRAYLENGTH, "arraylength"),
            (ATHROW, "athrow"), (CHECKCAST, "checkcast"), (WIDE, "wide"),
            (IFNULL, "ifnull"), (IFNONNULL, "ifnonnull"), (GOTO_W, "goto_w"),
        ] {
            names[op as usize] = name;
        }
        names
    });
    NAMES[op as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negate_pairs() {
        assert_eq!(negate(IFEQ), IFNE);
        assert_eq!(negate(IFNE), IFEQ);
        assert_eq!(negate(IFLT), IFGE);
        assert_eq!(negate(IF_ICMPLT), IF_ICMPGE);
        assert_eq!(negate(IF_ICMPLE), IF_ICMPGT);
        assert_eq!(negate(IF_ACMPEQ), IF_ACMPNE);
        assert_eq!(negate(IFNULL), IFNONNULL);
    }

    #[test]
    fn mnemonics_resolve() {
        assert_eq!(mnemonic(GOTO), "goto");
        assert_eq!(mnemonic(TABLESWITCH), "tableswitch");
        assert_eq!(mnemonic(0xfe), "?");
    }
}
