pub mod comment;
pub mod deletion;
pub mod error;
pub mod follow;
pub mod group;
pub mod page;
pub mod post;
pub mod user;
