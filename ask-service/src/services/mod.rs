pub mod credentials;
pub mod generator;
pub mod identity;
pub mod prompt;
pub mod providers;

pub use credentials::{ApiKey, CredentialPool, CredentialRotator};
pub use generator::{GenerationError, Generator, KeyStrategy};
pub use identity::{FirebaseVerifier, IdentityError, IdentityVerifier};
