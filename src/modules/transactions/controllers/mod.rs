pub mod admin_controller;
pub mod payment_controller;
pub mod webhook_controller;
