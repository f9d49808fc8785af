//! Authentication state trait and macro.

use crate::auth::SessionManager;

/// Trait for state types that can resolve sessions.
pub trait HasSessionBackend {
    fn sessions(&self) -> &SessionManager;
}

/// Macro to implement `HasSessionBackend` for state structs.
///
/// The struct must have a `sessions: Arc<SessionManager>` field.
///
/// # Example
/// ```ignore
/// use crate::impl_has_session_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub db: Database,
///     pub sessions: Arc<SessionManager>,
/// }
///
/// impl_has_session_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_session_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasSessionBackend for $state_type {
            fn sessions(&self) -> &$crate::auth::SessionManager {
                &self.sessions
            }
        }
    };
}
