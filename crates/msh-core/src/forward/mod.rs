//! Port forwarding specification parsing.

mod spec;

pub use spec::{Forward, ForwardKind, ForwardSpec};

/// Parse a `-L` / `-R` argument into a [`ForwardSpec`].
pub fn parse_forward(s: &str) -> crate::Result<ForwardSpec> {
    ForwardSpec::parse(s)
}
