use serde::{Deserialize, Serialize};

/// A bank or broker a portfolio is held at. Reference data only: removing
/// one clears the link on any portfolio that points at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institution {
    pub id: i64,
    pub name: String,
}

impl Institution {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
