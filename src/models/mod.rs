// src/models/mod.rs

pub mod comment;
pub mod post;
pub mod question;
pub mod user;
