pub mod connection;
pub mod domain;
pub mod ports;

pub use connection::{ConnectionCache, Connector};
pub use domain::{
    normalize_email, Account, Chat, ChatMessage, ChatRole, NewUser, ProviderProfile,
    ProviderTokens, User,
};
pub use ports::{DatabaseService, IdentityProvider, PortError, PortResult, ProviderSignIn};
