pub mod priority;
pub mod role;
pub mod ticket;
