//! Driver-level behavior: the fixture shapes that stress the 64KB and
//! stack ceilings, per-method recovery, wide-jump re-lowering, and the
//! basic control-flow encodings.

mod common;

use bcgen::ast::*;
use bcgen::codegen::{opcodes as op, ConstantPool, Gen};
use bcgen::{Config, DiagnosticKind, MethodOutcome};
use common::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn while_loop_golden_bytes() {
    // while (i < n) i += 1;
    let body = method(
        "m",
        2,
        Type::Void,
        vec![while_stmt(
            cmp(BinaryOp::Lt, local(0, Type::Int), local(1, Type::Int)),
            expr_stmt(assign(0, Type::Int, AssignOp::AddAssign, int(1))),
        )],
    );
    let code = lower_ok(&Config::new(), &body);
    assert_eq!(
        code.code,
        vec![
            0x1a, // iload_0
            0x1b, // iload_1
            0xa2, 0x00, 0x09, // if_icmpge -> exit
            0x84, 0x00, 0x01, // iinc 0, 1
            0xa7, 0xff, 0xf8, // goto -> test
            0xb1, // return
        ]
    );
}

#[test]
fn if_else_golden_bytes() {
    let body = method(
        "m",
        2,
        Type::Void,
        vec![if_else(
            local(0, Type::Boolean),
            expr_stmt(assign(1, Type::Int, AssignOp::Assign, int(1))),
            expr_stmt(assign(1, Type::Int, AssignOp::Assign, int(2))),
        )],
    );
    let code = lower_ok(&Config::new(), &body);
    assert_eq!(
        code.code,
        vec![
            0x1a, // iload_0
            0x99, 0x00, 0x08, // ifeq -> else
            0x04, 0x3c, // iconst_1, istore_1
            0xa7, 0x00, 0x05, // goto -> join
            0x05, 0x3c, // iconst_2, istore_1
            0xb1, // return
        ]
    );
}

#[test]
fn for_loop_with_continue() {
    // for (i = 0; i < n; i++) { if (b) continue; k += 1; }
    let body = method(
        "m",
        4,
        Type::Void,
        vec![for_stmt(
            vec![expr_stmt(assign(0, Type::Int, AssignOp::Assign, int(0)))],
            Some(cmp(BinaryOp::Lt, local(0, Type::Int), local(1, Type::Int))),
            vec![Expr::Unary(UnaryExpr {
                op: UnaryOp::PostInc,
                operand: Box::new(local(0, Type::Int)),
                ty: Type::Int,
                span: Span::NONE,
            })],
            block(vec![
                if_stmt(local(2, Type::Boolean), Stmt::Continue(ContinueStmt { span: Span::NONE })),
                expr_stmt(assign(3, Type::Int, AssignOp::AddAssign, int(1))),
            ]),
        )],
    );
    let code = lower_ok(&Config::new(), &body);
    // continue jumps to the update block, the loop tail jumps to the test
    assert_eq!(count_op(&code.code, op::GOTO), 2);
    assert_eq!(count_op(&code.code, op::IINC), 2);
}

#[test]
fn five_thousand_statements_under_a_loop_fit() {
    init_logging();
    // while (i < n) { if (i < n) { 5000 x i *= l + j; } }
    let stmts: Vec<Stmt> = (0..5000)
        .map(|_| {
            expr_stmt(assign(
                0,
                Type::Int,
                AssignOp::MulAssign,
                binary(BinaryOp::Add, local(2, Type::Long), local(4, Type::Long), Type::Long),
            ))
        })
        .collect();
    let body = method(
        "m",
        6,
        Type::Void,
        vec![while_stmt(
            cmp(BinaryOp::Lt, local(0, Type::Int), local(1, Type::Int)),
            if_stmt(cmp(BinaryOp::Lt, local(0, Type::Int), local(1, Type::Int)), block(stmts)),
        )],
    );
    let code = lower_ok(&Config::new(), &body);
    assert!(code.code.len() <= 65535);
    // loop structure survives: one backward goto, two conditions
    assert_eq!(count_op(&code.code, op::GOTO), 1);
    assert_eq!(count_op(&code.code, op::IF_ICMPGE), 2);
    assert_eq!(count_op(&code.code, op::LMUL), 5000);
}

#[test]
fn stack_depth_breach_is_reported_not_emitted() {
    // nest constructor calls whose wide argument lists pile up hundreds of
    // stack slots per level; ~130 levels cross the 65535-slot line while
    // staying far below the code-length ceiling
    let leaf_desc = format!("({})V", "J".repeat(253));
    let nest_desc = format!("({}Lp/X;)V", "J".repeat(252));
    let mut expr = new_object("p/X", &leaf_desc, vec![long(1); 253]);
    for _ in 0..130 {
        let mut args: Vec<Expr> = vec![long(1); 252];
        args.push(expr);
        expr = new_object("p/X", &nest_desc, args);
    }
    let body = method("deep", 1, Type::Void, vec![expr_stmt(expr), ret_void()]);
    match lower(&Config::new(), &body) {
        MethodOutcome::Rejected(diag) => {
            assert_eq!(diag.kind, DiagnosticKind::StackDepthExceeded);
        }
        MethodOutcome::Emitted(code) => {
            panic!("expected stack rejection, emitted max_stack {}", code.max_stack)
        }
    }
}

fn enum_clinit(constants: i32, heavy: bool) -> MethodBody {
    let enum_ty = Type::object("p/E");
    let mut stmts = Vec::new();
    for i in 0..constants {
        let name = format!("C{}", i);
        let (descriptor, args) = if heavy {
            (
                "(Ljava/lang/String;ILjava/lang/String;)V",
                vec![
                    str_lit(&name),
                    int(i),
                    str_lit(&format!("long description text for constant {}", i)),
                ],
            )
        } else {
            ("(Ljava/lang/String;I)V", vec![str_lit(&name), int(i)])
        };
        stmts.push(static_put("p/E", &name, enum_ty.clone(), new_object("p/E", descriptor, args)));
    }
    // $VALUES = new E[constants]; $VALUES[i] = Ci; ...
    stmts.push(local_decl(
        0,
        Type::object("[Lp/E;"),
        Expr::NewArray(NewArrayExpr {
            elem: enum_ty.clone(),
            length: Box::new(int(constants)),
            span: Span::NONE,
        }),
    ));
    for i in 0..constants {
        stmts.push(expr_stmt(Expr::Assign(AssignExpr {
            target: AssignTarget::Element {
                array: Box::new(local(0, Type::object("[Lp/E;"))),
                index: Box::new(int(i)),
                elem: enum_ty.clone(),
            },
            op: AssignOp::Assign,
            value: Box::new(Expr::StaticGet(StaticGetExpr {
                field: FieldRef {
                    owner: "p/E".to_string(),
                    name: format!("C{}", i),
                    ty: enum_ty.clone(),
                },
                span: Span::NONE,
            })),
            span: Span::NONE,
        })));
    }
    stmts.push(static_put("p/E", "$VALUES", Type::object("[Lp/E;"), local(0, Type::object("[Lp/E;"))));
    stmts.push(ret_void());
    MethodBody {
        id: MethodId::new("p/E", "<clinit>", "()V"),
        return_type: Type::Void,
        max_locals: 1,
        body: Block::new(stmts),
    }
}

#[test]
fn enum_initializer_with_2500_constants_compiles() {
    let code = lower_ok(&Config::new(), &enum_clinit(2500, false));
    assert!(code.code.len() <= 65535, "length {}", code.code.len());
    assert_eq!(count_op(&code.code, op::PUTSTATIC), 2501);
    assert_eq!(count_op(&code.code, op::AASTORE), 2500);
}

#[test]
fn literal_heavy_initializer_reports_against_the_clinit() {
    match lower(&Config::new(), &enum_clinit(2500, true)) {
        MethodOutcome::Rejected(diag) => {
            assert_eq!(diag.kind, DiagnosticKind::CodeSizeExceeded);
            assert!(diag.unit.is_clinit());
            assert_eq!(diag.to_string(), "code too large for static initializer of p/E");
        }
        MethodOutcome::Emitted(code) => {
            panic!("expected rejection, emitted {} bytes", code.code.len())
        }
    }
}

#[test]
fn one_oversized_method_does_not_abort_its_siblings() {
    init_logging();
    let ok = method("small", 1, Type::Int, vec![ret(int(7))]);
    let bodies = vec![enum_clinit(2500, true), ok, enum_clinit(2600, true)];
    let config = Config::new();
    let mut pool = ConstantPool::new();
    let out = Gen::new(&config, &mut pool).generate_class(&bodies).unwrap();
    assert_eq!(out.methods.len(), 1);
    assert_eq!(out.methods[0].id.name, "small");
    assert_eq!(out.diagnostics.len(), 2);
    assert!(out.diagnostics.iter().all(|d| d.kind == DiagnosticKind::CodeSizeExceeded));
}

#[test]
fn long_forward_jump_re_lowers_with_wide_gotos() {
    // the then-branch spans ~33KB, far past a 16-bit branch offset
    let then_stmts: Vec<Stmt> = (0..11000)
        .map(|_| expr_stmt(assign(1, Type::Int, AssignOp::AddAssign, int(1))))
        .collect();
    let body = method(
        "m",
        2,
        Type::Void,
        vec![if_stmt(local(0, Type::Boolean), block(then_stmts)), ret_void()],
    );
    let code = lower_ok(&Config::new(), &body);
    assert!(count_op(&code.code, op::GOTO_W) >= 1);
    assert_eq!(count_op(&code.code, op::IINC), 11000);
    assert!(code.code.len() <= 65535);
}

#[test]
fn emitted_methods_always_respect_the_format_fields() {
    for outcome in [
        lower(&Config::new(), &enum_clinit(2500, false)),
        lower(&Config::new(), &enum_clinit(2500, true)),
    ] {
        if let MethodOutcome::Emitted(code) = outcome {
            assert!(code.code.len() <= 65535);
            assert!(code.max_locals >= 1);
        }
    }
}

#[test]
fn line_numbers_follow_statement_spans() {
    let body = MethodBody {
        id: MethodId::new("p/A", "m", "()V"),
        return_type: Type::Void,
        max_locals: 1,
        body: Block::new(vec![
            Stmt::Expression(ExprStmt {
                expr: assign(0, Type::Int, AssignOp::Assign, int(1)),
                span: Span::at(10),
            }),
            Stmt::Expression(ExprStmt {
                expr: assign(0, Type::Int, AssignOp::Assign, int(2)),
                span: Span::at(12),
            }),
            Stmt::Return(ReturnStmt { value: None, span: Span::at(13) }),
        ]),
    };
    let code = lower_ok(&Config::new(), &body);
    let lines: Vec<u16> = code.line_numbers.iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![10, 12, 13]);
    assert!(code.line_numbers.windows(2).all(|w| w[0].start_pc < w[1].start_pc));
}
