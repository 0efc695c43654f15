//! Rule-driven replacement over files and directories
//!
//! This module validates rule lists, walks directories for supported
//! documents, picks an engine per file and reports one `ReplaceResult` per
//! document, sequentially or with a bounded pool of workers.

pub(crate) mod concurrent;
pub mod replacer;
pub mod results;
pub mod rule;
pub mod walk;

pub use replacer::{recommended_options, ReplaceOptions, Replacer};
pub use results::{failures, BatchSummary, ReplaceResult};
pub use rule::{load_rules, parse_rules_json, validate_rules, Rule};
pub use walk::find_documents;
