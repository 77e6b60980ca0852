// ABOUTME: Command implementations for each upgrade phase
// ABOUTME: Exports backup (before the upgrade) and compare (after the upgrade)

pub mod backup;
pub mod compare;

pub use backup::backup;
pub use compare::compare;
