use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoryError {
    #[error("generation backend unreachable: {0}")] BackendUnavailable(String),
    #[error("generation failed after {attempts} attempts: {message}")] Generation { message: String, attempts: u32 },
    #[error("generation cancelled")] Cancelled,
}
