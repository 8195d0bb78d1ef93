//! Authentication state traits and macro.

use crate::lifecycle::AuthService;

/// Trait for state types that can authenticate requests.
pub trait HasAuthBackend {
    fn auth(&self) -> &AuthService;
    fn secure_cookies(&self) -> bool;
    fn trust_forwarded_for(&self) -> bool;
}

/// Macro to implement `HasAuthBackend` for state structs with the standard fields.
///
/// The struct must have these fields:
/// - `auth: AuthService`
/// - `secure_cookies: bool`
/// - `trust_forwarded_for: bool`
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub auth: AuthService,
///     pub secure_cookies: bool,
///     pub trust_forwarded_for: bool,
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn auth(&self) -> &$crate::lifecycle::AuthService {
                &self.auth
            }
            fn secure_cookies(&self) -> bool {
                self.secure_cookies
            }
            fn trust_forwarded_for(&self) -> bool {
                self.trust_forwarded_for
            }
        }
    };
}
