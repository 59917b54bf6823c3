pub mod factory;
pub mod handlers;
pub mod observers;
pub mod tools;
