//! Identity, role resolution and the application session.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod provider;
mod profile;
mod session;

pub use principal::{Identity, Role, SessionUser, DEFAULT_ROLE};
pub use provider::{AuthProvider, LocalAuthProvider, RegisterRequest, SignInRequest, CREDENTIALS_COLLECTION, PROFILES_COLLECTION};
pub use profile::{ProfileResolver, StoreProfileResolver};
pub use session::{SessionBootstrap, SessionHandle, SessionState};
