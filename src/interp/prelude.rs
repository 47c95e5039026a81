//! The root environment frame ("type descriptor" dispatch case:
//! "so that *type values* act as constructors").
//!
//! Operators and control symbols (`__builtin_Add__`, `__builtin_if__`, …)
//! resolve through [`super::symbols::BuiltinSymbol::from_name`] regardless of
//! what's bound in the root frame — see
//! [`Interpreter::resolve_var`](super::Interpreter::resolve_var). The one
//! thing that fallback can't produce is a type value itself: a DRR or kernel
//! program that wants to coerce `t.x` to a `Str`, or build a fresh `Object`,
//! needs a named reference to `TypeTag::Str`/`TypeTag::Object` to call. This
//! module binds exactly those names, nothing else — every program still sees
//! an otherwise-empty lexical scope, matching plain parent-chain
//! frame model.

use crate::env::Frame;
use crate::value::{TypeTag, Value};

const TYPE_BINDINGS: &[(&str, TypeTag)] = &[
    ("Unit", TypeTag::Unit),
    ("Bool", TypeTag::Bool),
    ("Int", TypeTag::Int),
    ("Double", TypeTag::Double),
    ("Str", TypeTag::Str),
    ("List", TypeTag::List),
    ("Object", TypeTag::Object),
    ("Starred", TypeTag::Starred),
];

/// Builds the frame every top-level interpreter run is rooted at: a name for
/// each constructible [`TypeTag`], and nothing else.
pub fn root_frame() -> Frame {
    let mut frame = Frame::default();
    for &(name, tag) in TYPE_BINDINGS {
        frame.set(name, Value::Type(tag));
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_frame_exposes_every_constructible_type_by_name() {
        let frame = root_frame();
        for &(name, _) in TYPE_BINDINGS {
            assert!(matches!(frame.get(name), Some(Value::Type(_))), "missing binding for '{name}'");
        }
    }

    #[test]
    fn root_frame_does_not_bind_operator_names() {
        let frame = root_frame();
        assert!(frame.get("__builtin_Add__").is_none(), "operators resolve via the builtin-symbol fallback, not the frame");
    }
}
