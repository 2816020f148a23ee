
mod auth;
mod files;
