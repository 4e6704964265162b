//! Core types, like [`Request`] and [`Response`].

mod req;
pub use req::{Proto, Request};

mod resp;
pub use resp::{OnUpgrade, Response};

mod error;
pub use error::RequestError;
