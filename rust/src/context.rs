/// Identity of the logged-in user for one authenticated session.
///
/// Created on `StartSession`, dropped on `EndSession`. Connectors receive it to
/// build the persistence backend and the live channel; nothing else holds the
/// token.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
    pub token: String,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
        }
    }
}

// Never print the bearer token.
impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .finish()
    }
}
