//! Shared fixtures: AST builders and a minimal bytecode walker.
#![allow(dead_code)]

use bcgen::ast::*;
use bcgen::codegen::{opcodes, ConstantPool, Gen, MethodCode, MethodOutcome};
use bcgen::Config;

// ----------------------------------------------------------------------
// expression builders
// ----------------------------------------------------------------------

pub fn int(v: i32) -> Expr {
    Expr::Literal(LiteralExpr { value: Literal::Int(v), span: Span::NONE })
}

pub fn long(v: i64) -> Expr {
    Expr::Literal(LiteralExpr { value: Literal::Long(v), span: Span::NONE })
}

pub fn boolean(v: bool) -> Expr {
    Expr::Literal(LiteralExpr { value: Literal::Bool(v), span: Span::NONE })
}

pub fn str_lit(s: &str) -> Expr {
    Expr::Literal(LiteralExpr { value: Literal::Str(s.to_string()), span: Span::NONE })
}

pub fn local(slot: u16, ty: Type) -> Expr {
    Expr::Local(LocalExpr { local: LocalRef { slot, ty }, span: Span::NONE })
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr, ty: Type) -> Expr {
    Expr::Binary(BinaryExpr {
        op,
        left: Box::new(left),
        right: Box::new(right),
        ty,
        span: Span::NONE,
    })
}

/// String-typed `+`, the concat node.
pub fn concat(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Add, left, right, Type::string())
}

pub fn cmp(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    binary(op, left, right, Type::Boolean)
}

pub fn assign(slot: u16, ty: Type, op: AssignOp, value: Expr) -> Expr {
    Expr::Assign(AssignExpr {
        target: AssignTarget::Local(LocalRef { slot, ty }),
        op,
        value: Box::new(value),
        span: Span::NONE,
    })
}

pub fn cast(ty: Type, expr: Expr) -> Expr {
    Expr::Cast(CastExpr { ty, expr: Box::new(expr), span: Span::NONE })
}

pub fn call_static(owner: &str, name: &str, descriptor: &str, args: Vec<Expr>, ret: Type) -> Expr {
    Expr::Invoke(InvokeExpr {
        kind: InvokeKind::Static,
        owner: owner.to_string(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        receiver: None,
        args,
        ret,
        span: Span::NONE,
    })
}

pub fn new_object(class: &str, descriptor: &str, args: Vec<Expr>) -> Expr {
    Expr::New(NewExpr {
        class: class.to_string(),
        descriptor: descriptor.to_string(),
        args,
        span: Span::NONE,
    })
}

pub fn static_put(owner: &str, name: &str, ty: Type, value: Expr) -> Stmt {
    expr_stmt(Expr::Assign(AssignExpr {
        target: AssignTarget::Static(FieldRef {
            owner: owner.to_string(),
            name: name.to_string(),
            ty,
        }),
        op: AssignOp::Assign,
        value: Box::new(value),
        span: Span::NONE,
    }))
}

// ----------------------------------------------------------------------
// statement builders
// ----------------------------------------------------------------------

pub fn expr_stmt(expr: Expr) -> Stmt {
    Stmt::Expression(ExprStmt { expr, span: Span::NONE })
}

pub fn local_decl(slot: u16, ty: Type, init: Expr) -> Stmt {
    Stmt::LocalDecl(LocalDeclStmt {
        local: LocalRef { slot, ty },
        init: Some(init),
        span: Span::NONE,
    })
}

pub fn ret(value: Expr) -> Stmt {
    Stmt::Return(ReturnStmt { value: Some(value), span: Span::NONE })
}

pub fn ret_void() -> Stmt {
    Stmt::Return(ReturnStmt { value: None, span: Span::NONE })
}

pub fn if_stmt(condition: Expr, then_branch: Stmt) -> Stmt {
    Stmt::If(IfStmt {
        condition,
        then_branch: Box::new(then_branch),
        else_branch: None,
        span: Span::NONE,
    })
}

pub fn if_else(condition: Expr, then_branch: Stmt, else_branch: Stmt) -> Stmt {
    Stmt::If(IfStmt {
        condition,
        then_branch: Box::new(then_branch),
        else_branch: Some(Box::new(else_branch)),
        span: Span::NONE,
    })
}

pub fn while_stmt(condition: Expr, body: Stmt) -> Stmt {
    Stmt::While(WhileStmt { condition, body: Box::new(body), span: Span::NONE })
}

pub fn for_stmt(init: Vec<Stmt>, condition: Option<Expr>, update: Vec<Expr>, body: Stmt) -> Stmt {
    Stmt::For(ForStmt { init, condition, update, body: Box::new(body), span: Span::NONE })
}

pub fn block(statements: Vec<Stmt>) -> Stmt {
    Stmt::Block(Block::new(statements))
}

pub fn switch(selector: Expr, cases: Vec<SwitchCase>) -> Stmt {
    Stmt::Switch(SwitchStmt { selector, cases, span: Span::NONE })
}

pub fn case(labels: Vec<i32>, statements: Vec<Stmt>) -> SwitchCase {
    SwitchCase { labels, statements, span: Span::NONE }
}

pub fn default_case(statements: Vec<Stmt>) -> SwitchCase {
    SwitchCase { labels: vec![], statements, span: Span::NONE }
}

pub fn try_finally(body: Vec<Stmt>, finally: Vec<Stmt>) -> Stmt {
    Stmt::Try(TryStmt {
        body: Block::new(body),
        catches: vec![],
        finally_block: Some(Block::new(finally)),
        span: Span::NONE,
    })
}

pub fn try_catch(body: Vec<Stmt>, class: &str, slot: u16, handler: Vec<Stmt>) -> Stmt {
    Stmt::Try(TryStmt {
        body: Block::new(body),
        catches: vec![CatchClause {
            class: class.to_string(),
            slot,
            block: Block::new(handler),
            span: Span::NONE,
        }],
        finally_block: None,
        span: Span::NONE,
    })
}

pub fn method(name: &str, max_locals: u16, return_type: Type, statements: Vec<Stmt>) -> MethodBody {
    let descriptor = format!("(){}", return_type.descriptor());
    MethodBody {
        id: MethodId::new("p/Fixture", name, descriptor),
        return_type,
        max_locals,
        body: Block::new(statements),
    }
}

// ----------------------------------------------------------------------
// lowering helpers
// ----------------------------------------------------------------------

pub fn lower(config: &Config, body: &MethodBody) -> MethodOutcome {
    let mut pool = ConstantPool::new();
    Gen::new(config, &mut pool).generate_method(body).expect("lowering failed")
}

pub fn lower_ok(config: &Config, body: &MethodBody) -> MethodCode {
    match lower(config, body) {
        MethodOutcome::Emitted(code) => code,
        MethodOutcome::Rejected(diag) => panic!("unexpected rejection: {}", diag),
    }
}

// ----------------------------------------------------------------------
// bytecode walker
// ----------------------------------------------------------------------

/// Walk an instruction stream, yielding (pc, opcode) pairs.
///
/// Covers exactly the instruction set the generator emits; anything else
/// panics so a decoding drift fails tests loudly.
pub fn walk(code: &[u8]) -> Vec<(usize, u8)> {
    use opcodes::*;
    let mut out = Vec::new();
    let mut pc = 0usize;
    while pc < code.len() {
        let op = code[pc];
        out.push((pc, op));
        let len = match op {
            BIPUSH | LDC | NEWARRAY => 2,
            SIPUSH | LDC_W | LDC2_W | IINC | GETSTATIC | PUTSTATIC | GETFIELD | PUTFIELD
            | INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | NEW | ANEWARRAY | CHECKCAST
            | INSTANCEOF => 3,
            ILOAD | LLOAD | FLOAD | DLOAD | ALOAD | ISTORE | LSTORE | FSTORE | DSTORE
            | ASTORE => 2,
            IFEQ..=GOTO | IFNULL | IFNONNULL => 3,
            GOTO_W => 5,
            INVOKEINTERFACE | INVOKEDYNAMIC => 5,
            WIDE => {
                if code[pc + 1] == IINC {
                    6
                } else {
                    4
                }
            }
            TABLESWITCH => {
                let pad = (4 - ((pc + 1) % 4)) % 4;
                let base = pc + 1 + pad;
                let low = read_i32(code, base + 4);
                let high = read_i32(code, base + 8);
                let n = (high - low + 1) as usize;
                1 + pad + 12 + 4 * n
            }
            LOOKUPSWITCH => {
                let pad = (4 - ((pc + 1) % 4)) % 4;
                let base = pc + 1 + pad;
                let n = read_i32(code, base + 4) as usize;
                1 + pad + 8 + 8 * n
            }
            _ if op <= SASTORE || (POP..=SWAP).contains(&op) || (IADD..=LXOR).contains(&op)
                || (I2L..=DCMPG).contains(&op) || (IRETURN..=RETURN).contains(&op)
                || op == ARRAYLENGTH || op == ATHROW => 1,
            _ => panic!("walker met unexpected opcode 0x{:02x} at {}", op, pc),
        };
        pc += len;
    }
    out
}

pub fn read_i32(code: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]])
}

pub fn count_op(code: &[u8], wanted: u8) -> usize {
    walk(code).iter().filter(|(_, op)| *op == wanted).count()
}

/// Count occurrences of an opcode with a specific one-byte operand,
/// e.g. `bipush 77` markers planted by a test.
pub fn count_op_with_u8(code: &[u8], wanted: u8, operand: u8) -> usize {
    walk(code)
        .iter()
        .filter(|(pc, op)| *op == wanted && code[pc + 1] == operand)
        .count()
}
