//! Concrete session providers.

pub mod refresh_token;
