// src/rules/mod.rs

//! Rules describe how artifacts *could* be produced.
//!
//! - [`pattern`] compiles wildcard templates.
//! - [`rule`] holds [`Rule`], its builder and the capability traits.
//! - [`catalog`] is the per-scheduler rule registry.

pub mod catalog;
pub mod pattern;
pub mod rule;

pub use catalog::{Catalog, RuleBinding, RuleCatalog};
pub use pattern::{Pattern, Wildcards};
pub use rule::{DynamicSide, PatternSpec, Producer, Rule, RuleBuilder, Specificity};
