pub mod subscription_controller;
