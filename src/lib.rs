pub mod api_router;
pub mod assets;
pub mod audit;
pub mod auth;
pub mod companies;
pub mod config;
pub mod error;
pub mod intake;
pub mod invites;
pub mod membership;
pub mod secrets;
pub mod shared;
