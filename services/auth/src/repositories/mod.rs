//! Repositories for database operations

mod user;

pub use user::{DuplicateUser, PgUserRepository, UserRepository};

#[cfg(test)]
pub use user::MemoryUserRepository;
