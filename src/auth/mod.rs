pub mod credentials;
pub mod signer;

pub use credentials::{Credentials, Secret};
pub use signer::{login_timestamp, rest_timestamp, Signer, LOGIN_PATH};
