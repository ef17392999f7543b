//! String concatenation: both target strategies, bundle partitioning, and
//! flattening equivalence for pathological nesting shapes.

mod common;

use bcgen::ast::*;
use bcgen::codegen::opcodes as op;
use bcgen::{Config, TargetRelease};
use common::*;

fn legacy() -> Config {
    Config::new().with_target(TargetRelease::Legacy)
}

fn modern() -> Config {
    Config::new().with_target(TargetRelease::Modern)
}

fn assign_concat(value: Expr) -> MethodBody {
    method(
        "m",
        9,
        Type::string(),
        vec![ret(value)],
    )
}

#[test]
fn modern_simple_concat_is_one_indy() {
    let body = assign_concat(concat(str_lit("a="), local(0, Type::Int)));
    let code = lower_ok(&modern(), &body);
    assert_eq!(count_op(&code.code, op::INVOKEDYNAMIC), 1);
    assert_eq!(count_op(&code.code, op::NEW), 0);
    assert_eq!(code.bootstrap_methods.len(), 1);
}

#[test]
fn legacy_simple_concat_uses_string_builder() {
    let body = assign_concat(concat(str_lit("a="), local(0, Type::Int)));
    let code = lower_ok(&legacy(), &body);
    assert_eq!(count_op(&code.code, op::INVOKEDYNAMIC), 0);
    assert_eq!(count_op(&code.code, op::NEW), 1);
    // init + append("a=") + append(int) + toString
    assert_eq!(count_op(&code.code, op::INVOKESPECIAL), 1);
    assert_eq!(count_op(&code.code, op::INVOKEVIRTUAL), 3);
    assert!(code.bootstrap_methods.is_empty());
}

#[test]
fn all_constant_chain_folds_to_one_ldc() {
    let body = assign_concat(concat(concat(str_lit("a"), str_lit("b")), str_lit("c")));
    for config in [legacy(), modern()] {
        let code = lower_ok(&config, &body);
        assert_eq!(count_op(&code.code, op::LDC), 1);
        assert_eq!(count_op(&code.code, op::INVOKEDYNAMIC), 0);
        assert_eq!(count_op(&code.code, op::NEW), 0);
    }
}

/// Build `"s0" + v + "s1" + v + ...` with the given nesting direction.
fn chain(operands: usize, right_nested: bool) -> Expr {
    let piece = |i: usize| -> Vec<Expr> {
        vec![str_lit(&format!("s{}", i)), local((i % 4) as u16, Type::Int)]
    };
    let mut items: Vec<Expr> = (0..operands).flat_map(piece).collect();
    if right_nested {
        let mut expr = items.pop().unwrap();
        while let Some(prev) = items.pop() {
            expr = concat(prev, expr);
        }
        expr
    } else {
        let mut iter = items.into_iter();
        let mut expr = iter.next().unwrap();
        for next in iter {
            expr = concat(expr, next);
        }
        expr
    }
}

#[test]
fn six_hundred_operands_split_into_bounded_bundles() {
    let body = assign_concat(chain(600, false));
    let code = lower_ok(&modern(), &body);
    let sites = count_op(&code.code, op::INVOKEDYNAMIC);
    assert!(sites >= 4, "600 int operands need several bundles, got {}", sites);
    assert_eq!(code.bootstrap_methods.len(), sites);

    // the same chain on a legacy target appends every element instead
    let legacy_code = lower_ok(&legacy(), &body);
    assert_eq!(count_op(&legacy_code.code, op::INVOKEDYNAMIC), 0);
    assert!(count_op(&legacy_code.code, op::INVOKEVIRTUAL) > 1200);
}

#[test]
fn left_and_right_nesting_flatten_identically() {
    let left = assign_concat(chain(300, false));
    let right = assign_concat(chain(300, true));
    for config in [legacy(), modern()] {
        let a = lower_ok(&config, &left);
        let b = lower_ok(&config, &right);
        assert_eq!(a.code, b.code);
        assert_eq!(a.max_stack, b.max_stack);
        assert_eq!(a.bootstrap_methods, b.bootstrap_methods);
    }
}

#[test]
fn thousand_deep_right_nesting_does_not_recurse() {
    // a + (b + (c + ...)), one thousand levels
    let body = assign_concat(chain(1000, true));
    for config in [legacy(), modern()] {
        let code = lower_ok(&config, &body);
        assert!(!code.code.is_empty());
    }
}

#[test]
fn compound_string_append_reuses_the_chain() {
    // s += "x" + i
    let body = method(
        "m",
        2,
        Type::Void,
        vec![
            expr_stmt(assign(
                1,
                Type::string(),
                AssignOp::AddAssign,
                concat(str_lit("x"), local(0, Type::Int)),
            )),
            ret_void(),
        ],
    );
    let legacy_code = lower_ok(&legacy(), &body);
    // the waiting String swaps under the fresh builder
    assert_eq!(count_op(&legacy_code.code, op::SWAP), 1);

    let modern_code = lower_ok(&modern(), &body);
    assert_eq!(count_op(&modern_code.code, op::INVOKEDYNAMIC), 1);
}

#[test]
fn wide_operands_respect_the_slot_ceiling() {
    // 150 longs cannot share one 200-slot call site
    let mut items: Vec<Expr> = (0..150).map(|_| local(0, Type::Long)).collect();
    let mut expr = concat(str_lit(""), items.pop().unwrap());
    for item in items {
        expr = concat(expr, item);
    }
    let code = lower_ok(&modern(), &assign_concat(expr));
    assert!(count_op(&code.code, op::INVOKEDYNAMIC) >= 2);
}

#[test]
fn bundling_is_deterministic_across_runs() {
    let body = assign_concat(chain(450, false));
    let a = lower_ok(&modern(), &body);
    let b = lower_ok(&modern(), &body);
    assert_eq!(a.code, b.code);
    assert_eq!(a.bootstrap_methods, b.bootstrap_methods);
}

#[test]
fn null_literal_stays_a_dynamic_operand() {
    let body = assign_concat(concat(
        str_lit("v="),
        Expr::Literal(LiteralExpr { value: Literal::Null, span: Span::NONE }),
    ));
    let code = lower_ok(&modern(), &body);
    // null cannot fold into the recipe
    assert_eq!(count_op(&code.code, op::ACONST_NULL), 1);
    assert_eq!(count_op(&code.code, op::INVOKEDYNAMIC), 1);
}
