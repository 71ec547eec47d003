use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Bootstrap list of controller endpoints, used to learn the initial
/// `ConfigState` on startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Controllers {
    pub endpoints: Vec<String>,
}

impl Controllers {
    pub fn check(&self) -> Result<(), Error> {
        if self.endpoints.is_empty() {
            return Err(Error::NoControllers);
        }
        Ok(())
    }
}
