//! Data models

mod audit;
mod file;
mod guest_token;
mod membership;
mod notification;
mod principal;
mod subscription;
mod user;
mod workspace;

pub use audit::*;
pub use file::*;
pub use guest_token::*;
pub use membership::*;
pub use notification::*;
pub use principal::*;
pub use subscription::*;
pub use user::*;
pub use workspace::*;
