pub mod collaborators;
pub mod input_provider;
pub mod sensor_delegate;
pub mod session_host;
