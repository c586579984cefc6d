pub mod credential;
pub mod store;
pub mod validator;
pub mod vault;

pub use credential::{
    SessionCredential,
    SessionDescriptor,
    SessionTemplate,
};
pub use store::SessionStore;
pub use validator::SessionManager;
pub use vault::{
    KeystoreVault,
    MemoryVault,
    SessionVault,
};
