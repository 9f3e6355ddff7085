pub mod audio_session;
pub mod recovery;
