mod api_key;
mod uuid;

pub use api_key::ApiKey;
pub use self::uuid::{InvalidUuidError, Uuid};
