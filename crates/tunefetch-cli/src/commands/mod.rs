pub mod add;
pub mod config;
pub mod doctor;
pub mod fetch;
pub mod info;
