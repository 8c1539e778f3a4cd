//! Flat `name=value` credential file.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use crate::error::{Error, Result};

pub const GOOGLE: &str = "google";
pub const EDEN_AI: &str = "ed";

const REQUIRED: [&str; 2] = [GOOGLE, EDEN_AI];

/// Named secrets loaded once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    secrets: HashMap<String, String>,
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::CredentialsNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        Self::parse(&content)
    }

    /// Parses the file body and checks that every required key is present.
    pub fn parse(content: &str) -> Result<Self> {
        let mut secrets = HashMap::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once('=')
                .ok_or(Error::MalformedCredential { line: index + 1 })?;
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            secrets.insert(name.trim().to_owned(), value.to_owned());
        }

        for key in REQUIRED {
            if !secrets.contains_key(key) {
                return Err(Error::MissingCredential(key));
            }
        }
        Ok(Self { secrets })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.secrets.get(name).map(String::as_str)
    }

    pub fn google(&self) -> &str {
        self.get(GOOGLE).unwrap_or_default()
    }

    pub fn eden_ai(&self) -> &str {
        self.get(EDEN_AI).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.secrets.keys().collect();
        names.sort();
        f.debug_struct("Credentials").field("names", &names).finish()
    }
}
