pub mod admin;
pub mod balance;
pub mod profile;
pub mod ride;
pub mod tariff;
