pub mod audit;
pub mod credential;
pub mod monitor;
pub mod rules;
