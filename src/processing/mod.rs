pub mod cleaner;
pub mod metadata;
