pub mod data_client;
pub mod gamma_client;
pub mod http;

pub use data_client::{DataClient, PositionSource};
pub use gamma_client::{GammaClient, ProfileSearch};
pub use http::{HttpClient, RetryPolicy};
