//! Bundled actions.

pub mod find_and_replace;

pub use find_and_replace::FindAndReplace;
