use serde::Serialize;

pub mod connect;
pub mod payments;
pub mod webhook;

pub use connect::*;
pub use payments::*;
pub use webhook::*;

/// Standard envelope for single-object API responses
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}
