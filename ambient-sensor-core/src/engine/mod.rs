pub mod capture_engine;
pub mod clock;
pub mod controller;
pub(crate) mod raw_audio;
pub mod tap;
