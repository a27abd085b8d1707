//! tasktalk core library: session, API gateway, and the task and conversation controllers
//! shared by front ends (the CLI today).

pub mod auth;
pub mod chat;
pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod models;
pub mod session;
pub mod tasks;

pub use client::Client;
pub use error::{AuthError, ClientError, HttpError};
