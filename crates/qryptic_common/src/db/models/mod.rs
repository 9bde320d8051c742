pub mod auth_session;
pub mod client;
pub mod gateway;
pub mod group;
pub mod ip_pool;
pub mod settings;
pub mod sso_config;
pub mod user;

pub use auth_session::{AuthSession, NewAuthSession};
pub use client::{Client, NewClient};
pub use gateway::{Gateway, GatewaySummary, NewGateway};
pub use group::{Group, NewGroup};
pub use ip_pool::IpPoolEntry;
pub use settings::Settings;
pub use sso_config::{NewSsoConfig, SsoConfig};
pub use user::{NewUser, User, UserRole};
