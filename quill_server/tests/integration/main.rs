mod admin;
mod auth;
mod helpers;
mod posts;
