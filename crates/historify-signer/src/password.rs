//! Signing-key password source.
//!
//! The password is held in a [`Zeroizing`] buffer, never logged and never
//! written to disk; it is cleared as soon as the buffer drops.

use zeroize::Zeroizing;

use crate::error::{SignerError, SignerResult};

/// Environment variable carrying the signer password in non-interactive use.
pub const PASSWORD_ENV: &str = "HISTORIFY_PASSWORD";

/// Where the signer obtains the key password.
#[derive(Clone)]
pub enum PasswordSource {
    /// Consult [`PASSWORD_ENV`], then prompt interactively.
    EnvThenPrompt,
    /// A fixed password (tests and scripted use).
    Fixed(Zeroizing<String>),
    /// Never supply a password (unencrypted keys).
    None,
}

impl std::fmt::Debug for PasswordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose password material, even in debug output.
        match self {
            Self::EnvThenPrompt => f.write_str("PasswordSource::EnvThenPrompt"),
            Self::Fixed(_) => f.write_str("PasswordSource::Fixed(..)"),
            Self::None => f.write_str("PasswordSource::None"),
        }
    }
}

impl PasswordSource {
    /// A fixed password, wrapped for zeroization.
    #[must_use]
    pub fn fixed(password: impl Into<String>) -> Self {
        Self::Fixed(Zeroizing::new(password.into()))
    }

    /// Obtain the password, or `None` when this source supplies none.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::PasswordRequired`] if an interactive prompt
    /// fails (no terminal).
    pub fn obtain(&self, prompt: &str) -> SignerResult<Option<Zeroizing<String>>> {
        match self {
            Self::None => Ok(None),
            Self::Fixed(password) => Ok(Some(password.clone())),
            Self::EnvThenPrompt => {
                if let Ok(value) = std::env::var(PASSWORD_ENV) {
                    return Ok(Some(Zeroizing::new(value)));
                }
                let entered = rpassword::prompt_password(prompt)
                    .map_err(|_| SignerError::PasswordRequired)?;
                Ok(Some(Zeroizing::new(entered)))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_yields_nothing() {
        assert!(PasswordSource::None.obtain("pw: ").unwrap().is_none());
    }

    #[test]
    fn fixed_yields_password() {
        let source = PasswordSource::fixed("hunter2");
        let pw = source.obtain("pw: ").unwrap().unwrap();
        assert_eq!(pw.as_str(), "hunter2");
    }
}
