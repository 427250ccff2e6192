pub mod admin;
pub mod coordinator;
pub mod fare;
pub mod history;
pub mod join;
pub mod lifecycle;
pub mod pool;
