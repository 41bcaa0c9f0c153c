//! HTTP request handlers

pub mod alert;
pub mod auth;
pub mod bom;
pub mod health;
pub mod notification;
pub mod order;
pub mod product;
pub mod reporting;
pub mod stock;
pub mod user;
pub mod warehouse;

pub use alert::*;
pub use auth::*;
pub use bom::*;
pub use health::*;
pub use notification::*;
pub use order::*;
pub use product::*;
pub use reporting::*;
pub use stock::*;
pub use user::*;
pub use warehouse::*;

use crate::middleware::{AuthUser, ClientIp};
use crate::services::audit::Actor;

/// Acting user for a mutating service call
pub(crate) fn actor(user: &AuthUser, ClientIp(ip): ClientIp) -> Actor {
    Actor::new(user.user_id, ip)
}
