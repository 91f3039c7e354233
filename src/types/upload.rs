//! Uploaded file data structures

/// A file received in a `/predict` request
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Filename as sent by the client
    pub name: String,
    /// Raw file content
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}
