pub mod aws;
pub mod forwarding_host;
pub mod host;
pub mod invoke;
pub mod probe;
pub mod status;
