use serde::{Deserialize, Serialize};

/// `?q=` search box shared by the list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
}

impl SearchQuery {
    /// Blank searches mean "no filter".
    pub fn search(self) -> Option<String> {
        self.q
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
