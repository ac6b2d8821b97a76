pub mod customers;
pub mod providers;
pub mod slots;
