pub mod conflicts;
pub mod slots;
