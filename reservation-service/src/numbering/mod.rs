//! Invoice and receipt numbering: `{TAG}/{YYYY}/{MM}-{CATEGORY}-{NNNN}`.

pub mod allocator;
pub mod scanner;
pub mod scope;

pub use allocator::{format_identifier, next_identifier, parse_sequence, SequenceAllocator};
pub use scanner::{latest_in_scope, ScanHit};
pub use scope::{ScopeKey, Series};
