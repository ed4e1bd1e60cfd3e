//! Command-line client for the inference service.

pub mod http_client;
pub mod prevalidate;
pub mod stream_client;
pub mod view;

pub use http_client::{InferenceClient, TransportError};
pub use prevalidate::{PrevalidationError, Prevalidator};
pub use stream_client::StreamClient;
pub use view::ClientView;
