//! Variable Store (spec §4.1) and Expression Evaluator (spec §4.2).

mod expr;
mod store;
mod template;

pub use expr::Expr;
pub use store::{ScopeKind, VariableStore};
pub use template::render;
