pub mod orders;
pub mod push;
