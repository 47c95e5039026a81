//! The built-in symbol vocabulary.
//!
//! Every name here is double-underscore bracketed except the family that
//! spells out individual operators (`__builtin_Add__` … `__builtin_Not__`).
//! Resolving a free variable in the interpreter first attempts this table
//! before failing with a [`crate::error::ExcType::Name`] error.

/// Binary arithmetic and comparison operators (`__builtin_Add__` … `__builtin_LE__`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    EQ,
    NE,
    LT,
    GT,
    LE,
    GE,
}

impl BinaryOp {
    pub fn builtin_name(self) -> String {
        format!("__builtin_{self}__")
    }

    pub fn from_builtin_name(name: &str) -> Option<Self> {
        use strum::IntoEnumIterator;
        BinaryOp::iter().find(|op| op.builtin_name() == name)
    }
}

/// Unary operators (`__builtin_Not__`, `__builtin_Neg__`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    pub fn builtin_name(self) -> String {
        format!("__builtin_{self}__")
    }

    pub fn from_builtin_name(name: &str) -> Option<Self> {
        use strum::IntoEnumIterator;
        UnaryOp::iter().find(|op| op.builtin_name() == name)
    }
}

pub const IF: &str = "__builtin_if__";
pub const LIST: &str = "__builtin_list__";
pub const GETATTR: &str = "__builtin_getattr__";
pub const SETATTR: &str = "__builtin_setattr__";
pub const GETITEM: &str = "__builtin_getitem__";
pub const APPLY: &str = "__builtin_apply__";
pub const IDENTITY: &str = "__builtin_identity__";
pub const CALL: &str = "__builtin_call__";
pub const STARRED: &str = "__builtin_starred__";
pub const TO_STRING: &str = "__builtin_ToString__";
/// The continuation sentinel threaded through lowering and bound in the
/// environment at closure entry.
pub const RETURN: &str = "__builtin_return__";
pub const LET: &str = "__builtin_let__";
/// Not in listed vocabulary by name, but required by 's
/// determinism invariant, which names `print` as the one observable side
/// effect a core expression can produce. Resolved the same way as every
/// other built-in symbol (`BuiltinSymbol::from_name`), not bound as a
/// `Value::Native` closure, so it needs no capture of an interpreter-owned
/// sink at lowering time.
pub const PRINT: &str = "__builtin_print__";

/// A resolved reference into the built-in symbol vocabulary.
///
/// Nullary control symbols (`If`, `Apply`, `Id`, `List`) are interpreted at
/// the CPS level or as plain built-ins; `Op` covers every
/// unary/binary operator symbol, dispatched through the method-class tables
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinSymbol {
    If,
    Apply,
    Identity,
    List,
    /// Prints every argument, space-separated, as one line through the
    /// interpreter's configured [`crate::io::PrintSink`] (see `symbols::PRINT`).
    /// A CPS-level dispatch case like `If`/`Apply` only in that it needs
    /// interpreter state (the sink) rather than just the heap; unlike them
    /// it still installs `Halt` on `outer` since it produces a value
    /// (`Unit`) rather than tail-calling elsewhere.
    Print,
    Op(OpSymbol),
    /// Internal-only sentinel installed as the reduction record's outer
    /// function when a run finishes ("a dedicated halt sentinel
    /// distinct from any user-reachable builtin"). Never produced by
    /// [`BuiltinSymbol::from_name`] — user programs cannot reference it.
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpSymbol {
    Binary(BinaryOp),
    Unary(UnaryOp),
    Call,
    ToString,
    Starred,
    GetAttr,
    SetAttr,
    GetItem,
}

impl OpSymbol {
    pub fn num_operands(self) -> usize {
        match self {
            OpSymbol::Binary(_) | OpSymbol::GetAttr | OpSymbol::SetAttr | OpSymbol::GetItem => 2,
            OpSymbol::Unary(_) | OpSymbol::Call | OpSymbol::ToString | OpSymbol::Starred => 1,
        }
    }

    pub fn name(self) -> String {
        match self {
            OpSymbol::Binary(op) => op.builtin_name(),
            OpSymbol::Unary(op) => op.builtin_name(),
            OpSymbol::Call => CALL.to_string(),
            OpSymbol::ToString => TO_STRING.to_string(),
            OpSymbol::Starred => STARRED.to_string(),
            OpSymbol::GetAttr => GETATTR.to_string(),
            OpSymbol::SetAttr => SETATTR.to_string(),
            OpSymbol::GetItem => GETITEM.to_string(),
        }
    }
}

impl BuiltinSymbol {
    pub fn name(self) -> String {
        match self {
            BuiltinSymbol::If => IF.to_string(),
            BuiltinSymbol::Apply => APPLY.to_string(),
            BuiltinSymbol::Identity => IDENTITY.to_string(),
            BuiltinSymbol::List => LIST.to_string(),
            BuiltinSymbol::Print => PRINT.to_string(),
            BuiltinSymbol::Op(op) => op.name(),
            BuiltinSymbol::Halt => "__builtin_halt__".to_string(),
        }
    }

    /// Resolves a free-variable name against the built-in symbol table
    /// ("Resolving a free variable first attempts this table
    /// before failing with a name error").
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            IF => return Some(BuiltinSymbol::If),
            APPLY => return Some(BuiltinSymbol::Apply),
            IDENTITY => return Some(BuiltinSymbol::Identity),
            LIST => return Some(BuiltinSymbol::List),
            PRINT => return Some(BuiltinSymbol::Print),
            CALL => return Some(BuiltinSymbol::Op(OpSymbol::Call)),
            TO_STRING => return Some(BuiltinSymbol::Op(OpSymbol::ToString)),
            STARRED => return Some(BuiltinSymbol::Op(OpSymbol::Starred)),
            GETATTR => return Some(BuiltinSymbol::Op(OpSymbol::GetAttr)),
            SETATTR => return Some(BuiltinSymbol::Op(OpSymbol::SetAttr)),
            GETITEM => return Some(BuiltinSymbol::Op(OpSymbol::GetItem)),
            _ => {}
        }
        if let Some(op) = BinaryOp::from_builtin_name(name) {
            return Some(BuiltinSymbol::Op(OpSymbol::Binary(op)));
        }
        if let Some(op) = UnaryOp::from_builtin_name(name) {
            return Some(BuiltinSymbol::Op(OpSymbol::Unary(op)));
        }
        None
    }
}
