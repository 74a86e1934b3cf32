pub mod constants;
mod errors;
mod timeout;

pub use errors::LocatorError;
pub(crate) use timeout::check_duration;
pub use timeout::{
    MAX_INTERACTION_TIMEOUT_MS, MAX_WAIT_TIMEOUT_MS, validate_interaction_timeout,
    validate_wait_timeout,
};
