pub mod auth;
pub mod feed;
pub mod media;
pub mod posts;
pub mod session;
pub mod social;
pub mod users;
