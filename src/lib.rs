pub mod captcha;
pub mod commands;
pub mod config;
pub mod course;
pub mod loops;
pub mod monitor;
pub mod outcome;
pub mod pool;
pub mod portal;
pub mod rules;
pub mod session;
pub mod state;
