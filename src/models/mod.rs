pub mod commit;
pub mod reference;

pub use commit::{is_commit_id, CommitInfo, GitSignature, ZERO_SHA};
pub use reference::{GitReference, RefKind};
