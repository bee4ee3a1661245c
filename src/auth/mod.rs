//! Authentication layer: token signing, credential checks, sessions and the request gate.

pub mod clock;
pub mod keys;
pub mod middleware;
pub mod policy;
pub mod session;
pub mod token;
pub mod verify;

pub use clock::{Clock, ManualClock, SystemClock};
pub use keys::{KeyRing, SigningKey};
pub use middleware::{
    extract_bearer, request_gate, AdminIdentity, AppState, Identity, IdentityContext,
};
pub use policy::{Access, RoutePolicy};
pub use session::{IssuedToken, SessionAuthority};
pub use token::{Claims, TokenCodec};
pub use verify::{CredentialVerifier, HashCost, SecretHasher};
