use std::fmt::{self, Display, Formatter};

/// Remote services that need a token
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
pub enum Service {
    Fritz,
    Tns,
    Wiserep,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Fritz => "FRITZ",
            Service::Tns => "TNS",
            Service::Wiserep => "WISEREP",
        }
    }

    /// Environment variable checked before any other credential source
    pub fn env_var(&self) -> String {
        format!("{}_TOKEN", self.as_str())
    }

    /// Secret store account name for one kind of secret, e.g. `FRITZ_token`
    pub fn account(&self, kind: &str) -> String {
        format!("{}_{}", self.as_str(), kind)
    }
}

impl Display for Service {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
