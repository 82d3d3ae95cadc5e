//! Credentials: password hashing, session tokens and reset tokens

mod password;
pub mod reset;
mod tokens;

pub use password::PasswordHasher;
pub use reset::ResetToken;
pub use tokens::{Claims, JwtIssuer};
