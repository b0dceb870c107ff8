pub mod pending;
pub mod route;
