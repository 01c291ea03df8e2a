pub mod auth_controller;
pub mod user_controller;
