// crates/core/src/lib.rs
pub mod error;
pub mod nbt;
pub mod player_data;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod types;
pub mod user_cache;

pub use error::*;
pub use player_data::{ActiveEffect, PlayerData};
pub use types::*;
pub use user_cache::{read_user_cache, User};
