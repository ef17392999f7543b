//! String concatenation lowering.
//!
//! A `+` chain over strings is first flattened, left to right, into a
//! sequence of constant segments and typed operands; the tree shape never
//! matters after this point, so `a+(b+(c+d))` and `((a+b)+c)+d` harvest the
//! same chain. The chain then lowers through one of two strategies:
//!
//! - StringBuilder (legacy targets): one builder, one `append` per element,
//!   `toString()`. No inherent operand bound beyond the code budget.
//! - invokedynamic (modern targets): `StringConcatFactory.makeConcatWithConstants`
//!   call sites driven by a recipe string. Recipes and bootstrap argument
//!   lists are bounded by the constant-pool encoding, so an oversized chain
//!   is partitioned into bundles, each feeding its String result into the
//!   next bundle as a leading operand.
//!
//! Partitioning is first-fit greedy in chain order: a bundle closes when the
//! next element would overflow the argument-slot, recipe-length or
//! bootstrap-argument ceiling. The plan depends only on the chain and the
//! ceilings, so identical chains lower to identical bytes.

use super::constpool::REF_INVOKE_STATIC;
use super::gen::BodyGen;
use super::instr::Instr;
use super::opcodes;
use crate::ast::{Expr, Literal, LiteralExpr, Type};
use crate::consts;
use crate::error::Result;

/// Recipe marker for an operand taken from the stack.
const TAG_ARG: char = '\u{1}';
/// Recipe marker for a constant passed as a bootstrap argument.
const TAG_CONST: char = '\u{2}';

const MAKE_CONCAT_DESC: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;\
Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;";

/// One element of a flattened concatenation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ChainItem {
    Const(String),
    Operand(Type),
}

/// Flattened chain element carrying the operand expression.
enum Segment<'e> {
    Const(String),
    Dyn(&'e Expr),
}

impl Segment<'_> {
    fn item(&self) -> ChainItem {
        match self {
            Segment::Const(s) => ChainItem::Const(s.clone()),
            Segment::Dyn(e) => ChainItem::Operand(e.ty()),
        }
    }
}

/// One planned invokedynamic call site.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BundlePlan {
    pub recipe: String,
    pub const_args: Vec<String>,
    /// operand types in stack order, including a chained leading String
    pub operand_types: Vec<Type>,
    /// how many of the chain's own operands this bundle consumes
    pub consumed_operands: usize,
    /// no element added yet (a chained leading slot does not count)
    fresh: bool,
}

impl BundlePlan {
    fn new(chained: bool) -> Self {
        let mut plan = BundlePlan {
            recipe: String::new(),
            const_args: Vec::new(),
            operand_types: Vec::new(),
            consumed_operands: 0,
            fresh: true,
        };
        if chained {
            plan.recipe.push(TAG_ARG);
            plan.operand_types.push(Type::string());
        }
        plan
    }

    fn arg_slots(&self) -> u16 {
        self.operand_types.iter().map(|t| t.width()).sum()
    }

    fn descriptor(&self) -> String {
        let mut desc = String::from("(");
        for ty in &self.operand_types {
            desc.push_str(&ty.descriptor());
        }
        desc.push_str(")Ljava/lang/String;");
        desc
    }
}

/// Ceilings one call site must stay under.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BundleLimits {
    pub arg_slots: u16,
    pub recipe_length: usize,
    pub bootstrap_args: usize,
}

/// First-fit greedy partition of a chain into call-site bundles.
///
/// `leading_operand` marks a String already on the stack (compound assigns
/// and bundle chaining); it occupies the first slot of the first bundle.
/// Every bundle accepts at least one element, since a constant too large or
/// marker-tainted for the recipe is demoted to a bootstrap argument (two
/// recipe bytes worst case) and a single operand is at most two slots.
pub(crate) fn plan_bundles(
    items: &[ChainItem],
    leading_operand: bool,
    limits: BundleLimits,
) -> Vec<BundlePlan> {
    let mut bundles: Vec<BundlePlan> = Vec::new();
    let mut current = BundlePlan::new(leading_operand);

    for item in items {
        let fits = match item {
            ChainItem::Operand(ty) => {
                current.arg_slots() + ty.width() <= limits.arg_slots
                    && current.recipe.len() + 1 <= limits.recipe_length
            }
            ChainItem::Const(text) => {
                if const_needs_arg(text, &limits) {
                    current.recipe.len() + 1 <= limits.recipe_length
                        && 1 + current.const_args.len() + 1 <= limits.bootstrap_args
                } else {
                    current.recipe.len() + text.len() <= limits.recipe_length
                }
            }
        };
        // a fresh bundle takes its first element unconditionally, so the
        // partition always advances; Config keeps the ceilings above the
        // worst single-element cost
        if !fits && !current.fresh {
            bundles.push(current);
            // the closed bundle's String result chains into the next one
            current = BundlePlan::new(true);
        }
        current.fresh = false;
        match item {
            ChainItem::Operand(ty) => {
                current.recipe.push(TAG_ARG);
                current.operand_types.push(ty.clone());
                current.consumed_operands += 1;
            }
            ChainItem::Const(text) => {
                if const_needs_arg(text, &limits) {
                    current.recipe.push(TAG_CONST);
                    current.const_args.push(text.clone());
                } else {
                    current.recipe.push_str(text);
                }
            }
        }
    }
    bundles.push(current);
    bundles
}

/// Constants carrying recipe markers, or too long to inline without
/// crowding the recipe, pass as bootstrap arguments instead.
fn const_needs_arg(text: &str, limits: &BundleLimits) -> bool {
    text.len() > limits.recipe_length / 2 || text.contains(TAG_ARG) || text.contains(TAG_CONST)
}

impl<'a> BodyGen<'a> {
    /// Lower a string concatenation tree, leaving the String on the stack.
    pub(crate) fn gen_concat(&mut self, root: &Expr) -> Result<()> {
        let segments = flatten(root);
        self.gen_chain(false, &segments)
    }

    /// Lower `<string on stack> + value` (compound assignment shape).
    pub(crate) fn gen_concat_onto_stack(&mut self, value: &Expr) -> Result<()> {
        let segments = flatten(value);
        self.gen_chain(true, &segments)
    }

    fn gen_chain(&mut self, leading: bool, segments: &[Segment<'_>]) -> Result<()> {
        if !leading {
            // a fully constant chain folds to one literal
            let mut folded = String::new();
            let all_const = segments.iter().all(|s| match s {
                Segment::Const(text) => {
                    folded.push_str(text);
                    true
                }
                Segment::Dyn(_) => false,
            });
            if all_const {
                let index = self.pool.add_string(&folded)?;
                return self.code.emit(Instr::Ldc(index));
            }
        }
        match self.config.target {
            crate::config::TargetRelease::Legacy => self.gen_builder_chain(leading, segments),
            crate::config::TargetRelease::Modern => self.gen_indy_chain(leading, segments),
        }
    }

    // ------------------------------------------------------------------
    // StringBuilder strategy
    // ------------------------------------------------------------------

    fn gen_builder_chain(&mut self, leading: bool, segments: &[Segment<'_>]) -> Result<()> {
        let builder = consts::JAVA_LANG_STRING_BUILDER;
        let class = self.pool.add_class(builder)?;
        let init = self.pool.add_method_ref(builder, "<init>", "()V")?;

        self.code.emit(Instr::New { index: class })?;
        self.code.emit(Instr::Op(opcodes::DUP))?;
        self.code.emit(Instr::Invoke {
            op: opcodes::INVOKESPECIAL,
            index: init,
            arg_slots: 1,
            ret_slots: 0,
        })?;
        if leading {
            // bring the builder under the waiting String, then append it
            self.code.emit(Instr::Op(opcodes::SWAP))?;
            self.emit_append(&Type::string())?;
        }

        for segment in segments {
            match segment {
                Segment::Const(text) => {
                    let index = self.pool.add_string(text)?;
                    self.code.emit(Instr::Ldc(index))?;
                    self.emit_append(&Type::string())?;
                }
                Segment::Dyn(expr) => {
                    let ty = expr.ty();
                    self.gen_expr(expr)?;
                    self.emit_append(&ty)?;
                }
            }
        }

        let to_string =
            self.pool.add_method_ref(builder, "toString", "()Ljava/lang/String;")?;
        self.code.emit(Instr::Invoke {
            op: opcodes::INVOKEVIRTUAL,
            index: to_string,
            arg_slots: 1,
            ret_slots: 1,
        })
    }

    fn emit_append(&mut self, ty: &Type) -> Result<()> {
        let builder = consts::JAVA_LANG_STRING_BUILDER;
        let param = match ty {
            Type::Boolean => "Z",
            Type::Char => "C",
            Type::Long => "J",
            Type::Float => "F",
            Type::Double => "D",
            Type::Reference(name) if name == consts::JAVA_LANG_STRING => "Ljava/lang/String;",
            Type::Reference(_) => "Ljava/lang/Object;",
            // byte and short go through the int overload
            _ => "I",
        };
        let descriptor = format!("({})Ljava/lang/StringBuilder;", param);
        let index = self.pool.add_method_ref(builder, "append", &descriptor)?;
        self.code.emit(Instr::Invoke {
            op: opcodes::INVOKEVIRTUAL,
            index,
            arg_slots: 1 + ty.width(),
            ret_slots: 1,
        })
    }

    // ------------------------------------------------------------------
    // invokedynamic strategy
    // ------------------------------------------------------------------

    fn gen_indy_chain(&mut self, leading: bool, segments: &[Segment<'_>]) -> Result<()> {
        let items: Vec<ChainItem> = segments.iter().map(Segment::item).collect();
        let limits = BundleLimits {
            arg_slots: self.config.indy_arg_slots,
            recipe_length: self.config.recipe_length,
            bootstrap_args: consts::MAX_BOOTSTRAP_ARGS,
        };
        let plan = plan_bundles(&items, leading, limits);
        log::trace!(
            "concat chain: {} elements -> {} bundle(s)",
            items.len(),
            plan.len()
        );

        let operands: Vec<&Expr> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Dyn(e) => Some(*e),
                Segment::Const(_) => None,
            })
            .collect();

        let mut next_operand = 0;
        for bundle in &plan {
            for expr in &operands[next_operand..next_operand + bundle.consumed_operands] {
                self.gen_expr(expr)?;
            }
            next_operand += bundle.consumed_operands;
            self.emit_indy_bundle(bundle)?;
        }
        debug_assert_eq!(next_operand, operands.len());
        Ok(())
    }

    fn emit_indy_bundle(&mut self, bundle: &BundlePlan) -> Result<()> {
        let factory = self.pool.add_method_ref(
            consts::STRING_CONCAT_FACTORY,
            "makeConcatWithConstants",
            MAKE_CONCAT_DESC,
        )?;
        let handle = self.pool.add_method_handle(REF_INVOKE_STATIC, factory)?;

        let mut args = Vec::with_capacity(1 + bundle.const_args.len());
        args.push(self.pool.add_string(&bundle.recipe)?);
        for constant in &bundle.const_args {
            args.push(self.pool.add_string(constant)?);
        }
        let bootstrap = self.pool.add_bootstrap_method(handle, args)?;
        self.bootstrap_used.push(bootstrap);

        let index = self.pool.add_invoke_dynamic(
            bootstrap,
            "makeConcatWithConstants",
            &bundle.descriptor(),
        )?;
        self.code.emit(Instr::Indy {
            index,
            arg_slots: bundle.arg_slots(),
            ret_slots: 1,
        })
    }
}

/// Flatten a concatenation tree into chain order without host recursion.
///
/// Constants fold into segments as they would print; adjacent constants
/// merge. Everything else, null literals included, stays a typed operand.
fn flatten(root: &Expr) -> Vec<Segment<'_>> {
    let mut segments: Vec<Segment<'_>> = Vec::new();
    let mut work: Vec<&Expr> = vec![root];
    while let Some(expr) = work.pop() {
        if let Expr::Binary(b) = expr {
            if expr.is_string_concat() {
                work.push(&b.right);
                work.push(&b.left);
                continue;
            }
        }
        match expr {
            Expr::Literal(LiteralExpr { value, .. }) if !matches!(value, Literal::Null) => {
                let text = value.to_java_string();
                if let Some(Segment::Const(prev)) = segments.last_mut() {
                    prev.push_str(&text);
                } else {
                    segments.push(Segment::Const(text));
                }
            }
            _ => segments.push(Segment::Dyn(expr)),
        }
    }
    segments
}
