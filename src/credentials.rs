//! Service credential lookup.
//!
//! Tokens are taken from the first source that has them: the `<SERVICE>_TOKEN`
//! environment variable, the system secret store, a base64 obfuscated file in the
//! config directory, and finally an interactive prompt. Headless mode
//! (`FOLLOWUP_MODE=HEADLESS`) skips the secret store and the prompt.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::util::*;

pub const MODE_ENV_VAR: &str = "FOLLOWUP_MODE";

const TOKEN: &str = "token";
const USER: &str = "user";
const PASSWORD: &str = "password";

pub enum Lookup {
    Found(String),
    Missing,
    /// No secret store backend on this system
    Unavailable,
}

pub trait SecretStore: Send + Sync {
    fn get(&self, service: Service, account: &str) -> Result<Lookup>;
    fn set(&self, service: Service, account: &str, secret: &str) -> Result<()>;
}

/// The platform keychain
pub struct KeyringStore;

fn is_unavailable(e: &keyring::Error) -> bool {
    matches!(
        e,
        keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_)
    )
}

impl SecretStore for KeyringStore {
    fn get(&self, service: Service, account: &str) -> Result<Lookup> {
        match keyring::Entry::new(service.as_str(), &service.account(account))
            .and_then(|entry| entry.get_password())
        {
            Ok(secret) => Ok(Lookup::Found(secret)),
            Err(keyring::Error::NoEntry) => Ok(Lookup::Missing),
            Err(e) if is_unavailable(&e) => {
                debug!("Secret store unavailable: {}", e);
                Ok(Lookup::Unavailable)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, service: Service, account: &str, secret: &str) -> Result<()> {
        keyring::Entry::new(service.as_str(), &service.account(account))?
            .set_password(secret)?;
        Ok(())
    }
}

pub trait Prompt: Send + Sync {
    fn login(&self, service: Service) -> Result<String>;
    fn secret(&self, service: Service, what: &str) -> Result<String>;
}

/// Asks on the terminal, without echo for secrets
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn login(&self, service: Service) -> Result<String> {
        print!("Enter your {} login: ", service);
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }

    fn secret(&self, service: Service, what: &str) -> Result<String> {
        let answer = rpassword::prompt_password(format!("Enter your {} {}: ", service, what))?;
        Ok(answer.trim().to_string())
    }
}

/// `user,secret` pairs stored base64 encoded. This is obfuscation, not encryption
pub struct ObfuscatedFile {
    path: PathBuf,
}

impl ObfuscatedFile {
    pub fn new(directory: &Path, service: Service) -> Self {
        Self {
            path: directory.join(format!("{}.id", service.as_str().to_lowercase())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Option<(String, String)>> {
        let encoded = match fs::read_to_string(&self.path) {
            Ok(encoded) => encoded,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let corrupted = |reason: String| Error::CredentialFile {
            path: self.path.clone(),
            reason,
        };
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| corrupted(e.to_string()))?;
        let decoded = String::from_utf8(decoded).map_err(|e| corrupted(e.to_string()))?;
        let (user, secret) = decoded
            .split_once(',')
            .ok_or_else(|| corrupted("missing separator".to_string()))?;

        Ok(Some((user.to_string(), secret.to_string())))
    }

    pub fn write(&self, user: &str, secret: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, STANDARD.encode(format!("{},{}", user, secret)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct CredentialResolver {
    headless: bool,
    directory: PathBuf,
    store: Box<dyn SecretStore>,
    prompt: Box<dyn Prompt>,
    env: EnvLookup,
}

impl CredentialResolver {
    pub fn new(
        directory: impl Into<PathBuf>,
        headless: bool,
        store: Box<dyn SecretStore>,
        prompt: Box<dyn Prompt>,
    ) -> Self {
        Self {
            headless,
            directory: directory.into(),
            store,
            prompt,
            env: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// Keychain and terminal backed resolver; headless mode is read from the environment
    pub fn from_env(directory: impl Into<PathBuf>) -> Self {
        let headless = std::env::var(MODE_ENV_VAR)
            .map(|mode| mode.eq_ignore_ascii_case("HEADLESS"))
            .unwrap_or(false);
        if headless {
            info!("Running headless, the secret store and prompts are disabled");
        }
        Self::new(
            directory,
            headless,
            Box::new(KeyringStore),
            Box::new(TerminalPrompt),
        )
    }

    #[cfg(test)]
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    fn env_value(&self, key: &str) -> Option<String> {
        (self.env)(key).filter(|v| !v.trim().is_empty())
    }

    fn missing(&self, service: Service) -> Error {
        Error::MissingCredentials {
            service,
            env_var: service.env_var(),
        }
    }

    /// Returns `None` when the store has no entry, or when it can't be used at all
    /// (`store_available` is then cleared)
    fn stored(
        &self,
        service: Service,
        account: &str,
        store_available: &mut bool,
    ) -> Result<Option<String>> {
        if self.headless || !*store_available {
            *store_available = false;
            return Ok(None);
        }
        match self.store.get(service, account)? {
            Lookup::Found(secret) => Ok(Some(secret)),
            Lookup::Missing => Ok(None),
            Lookup::Unavailable => {
                info!(
                    "No secret store available, falling back to base64 obfuscation for {}",
                    service
                );
                *store_available = false;
                Ok(None)
            }
        }
    }

    fn non_empty(&self, service: Service, answer: String) -> Result<String> {
        if answer.is_empty() {
            Err(self.missing(service))
        } else {
            Ok(answer)
        }
    }

    /// API token of a service
    pub fn token(&self, service: Service) -> Result<String> {
        if let Some(token) = self.env_value(&service.env_var()) {
            debug!("Using {} token from {}", service, service.env_var());
            return Ok(token);
        }

        let mut store_available = true;
        if let Some(token) = self.stored(service, TOKEN, &mut store_available)? {
            info!("Got {} token", service);
            return Ok(token);
        }

        let file = ObfuscatedFile::new(&self.directory, service);
        if let Some((_, token)) = file.read()? {
            info!("Got {} token from {}", service, file.path().display());
            return Ok(token);
        }

        if self.headless {
            return Err(self.missing(service));
        }

        let token = self.non_empty(service, self.prompt.secret(service, TOKEN)?)?;
        if store_available {
            self.store.set(service, TOKEN, &token)?;
        } else {
            file.write("", &token)?;
        }
        info!("Got {} token", service);
        Ok(token)
    }
}

// Login based services; the current ones all use tokens
#[allow(dead_code)]
impl CredentialResolver {
    /// Login and password of a service
    pub fn user_and_password(&self, service: Service) -> Result<(String, String)> {
        let prefix = service.as_str();
        if let (Some(user), Some(password)) = (
            self.env_value(&format!("{}_USER", prefix)),
            self.env_value(&format!("{}_PASSWORD", prefix)),
        ) {
            return Ok((user, password));
        }

        let mut store_available = true;
        let user = self.stored(service, USER, &mut store_available)?;
        let password = self.stored(service, PASSWORD, &mut store_available)?;
        if let (Some(user), Some(password)) = (&user, &password) {
            info!("Got {} credentials", service);
            return Ok((user.clone(), password.clone()));
        }

        let file = ObfuscatedFile::new(&self.directory, service);
        if let Some(pair) = file.read()? {
            info!("Got {} credentials from {}", service, file.path().display());
            return Ok(pair);
        }

        if self.headless {
            return Err(self.missing(service));
        }

        let user = match user {
            Some(user) => user,
            None => self.non_empty(service, self.prompt.login(service)?)?,
        };
        let password = match password {
            Some(password) => password,
            None => self.non_empty(service, self.prompt.secret(service, PASSWORD)?)?,
        };

        if store_available {
            self.store.set(service, USER, &user)?;
            self.store.set(service, PASSWORD, &password)?;
        } else {
            warn!(
                "Storing {} credentials base64 obfuscated in {}",
                service,
                file.path().display()
            );
            file.write(&user, &password)?;
        }
        info!("Got {} credentials", service);
        Ok((user, password))
    }

    pub fn user(&self, service: Service) -> Result<String> {
        Ok(self.user_and_password(service)?.0)
    }

    pub fn password(&self, service: Service) -> Result<String> {
        Ok(self.user_and_password(service)?.1)
    }
}
