//! huddle-server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod channels;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod groups;
pub mod moderation;
pub mod roles;
pub mod rooms;
pub mod routes;
pub mod state;
pub mod users;
pub mod video;
pub mod ws;
