//! Cross-reference link resolution for generated documentation.
//!
//! Reference targets are loaded once per build into a [`index::TargetIndex`];
//! [`resolver::LinkResolver`] turns `<referenceLink>` and `<conceptualLink>`
//! markers into [`types::ResolvedLink`] decisions that [`markup::render`]
//! writes out.

pub mod cer;
pub mod commands;
pub mod conceptual;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod external;
pub mod hasher;
pub mod index;
pub mod markup;
pub mod query;
pub mod reflection;
pub mod resolver;
pub mod scanner;
pub mod storage;
pub mod types;
