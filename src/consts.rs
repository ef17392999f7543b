// Hard numeric ceilings of the class-file format, plus the tunable defaults
// the generator enforces while lowering method bodies.

/// Maximum bytecode length of a single method (u2 code_length field).
pub const MAX_CODE_LENGTH: usize = 65535;

/// Maximum operand stack depth recordable in the max_stack field.
pub const MAX_STACK: u32 = 65535;

/// Maximum local variable slots recordable in the max_locals field.
pub const MAX_LOCALS: u32 = 65535;

/// Maximum dynamic argument slots a single makeConcatWithConstants call site
/// may take (javac's MAX_INDY_CONCAT_ARG_SLOTS).
pub const MAX_INDY_ARG_SLOTS: u16 = 200;

/// Default ceiling for one concat recipe string. The recipe lands in a
/// CONSTANT_Utf8 bootstrap argument, so it must stay well inside the u2
/// length encoding.
pub const MAX_RECIPE_LENGTH: usize = 512;

/// Maximum static bootstrap arguments per call site (recipe included),
/// bounded by the bootstrap invocation's own parameter list.
pub const MAX_BOOTSTRAP_ARGS: usize = 251;

/// Maximum entries in a class constant pool (u2 count, index 0 reserved).
pub const MAX_POOL_ENTRIES: usize = 65534;

// Well-known class names used by the concat strategies
pub const JAVA_LANG_STRING: &str = "java/lang/String";
pub const JAVA_LANG_STRING_BUILDER: &str = "java/lang/StringBuilder";
pub const STRING_CONCAT_FACTORY: &str = "java/lang/invoke/StringConcatFactory";
