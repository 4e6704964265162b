/// Errors that can occur when registering a route.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// The method or url was empty.
    #[error("empty pattern")]
    EmptyPattern,
    /// Another route already resolves to the same trie leaf.
    #[error("route already registered: {method} {url}")]
    RouteAlreadyRegistered {
        /// Method of the rejected route.
        method: String,
        /// Url of the rejected route.
        url: String,
    },
}

impl RegistrationError {
    /// Create a new `RouteAlreadyRegistered` error.
    pub fn route_already_registered(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self::RouteAlreadyRegistered {
            method: method.into(),
            url: url.into(),
        }
    }
}
