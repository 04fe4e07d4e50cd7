use std::fmt;
use std::path::Path;

use crate::error::{GeneratorError, Result};

/// An API token. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads a token from a file, ignoring surrounding whitespace.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let token = content.trim();
        if token.is_empty() {
            return Err(GeneratorError::Config(format!(
                "Token file {} is empty",
                path.display()
            )));
        }
        Ok(Self(token.to_string()))
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_token_from_file_is_trimmed() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "  ghp_secret  ").unwrap();

        let token = Token::from_file(file.path()).unwrap();
        assert_eq!(token.as_str(), "ghp_secret");
    }

    #[test]
    fn test_empty_token_file() {
        let file = NamedTempFile::new().unwrap();
        assert!(matches!(
            Token::from_file(file.path()),
            Err(GeneratorError::Config(_))
        ));
    }

    #[test]
    fn test_debug_is_redacted() {
        let token = Token::from("ghp_secret");
        assert_eq!(format!("{token:?}"), "Token(***)");
    }
}
