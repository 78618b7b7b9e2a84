pub mod credentials;
pub mod validate;

pub use credentials::{Credentials, generate_token, hash_password, new_uuid, verify_password};
pub use validate::{REDACTED_PASSWORD, redact_uri_password, validate_mongodb_uri};
