pub mod cli;
pub mod models;
pub mod run;
pub mod status;
pub mod validate;
