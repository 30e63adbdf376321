
use std::error::Error;
use std::fmt::{self, Display, Debug};

pub trait ErrorDescription {
    fn description(&self) -> impl Display;
    /// Process exit code the binary should use when this error is fatal.
    fn code(&self) -> Option<i32> {
        None
    }
    fn error_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

pub struct GenericError<T>(pub T) where T: ErrorDescription;

impl<T> GenericError<T>
where
    T: ErrorDescription,
{
    pub const fn new(err: T) -> Self {
        Self(err)
    }

    pub fn into_inner(self) -> T {
        self.0
    }

    pub fn as_inner(&self) -> &T {
        &self.0
    }

    pub fn error_name(&self) -> &'static str {
        self.0.error_name()
    }

    pub fn code(&self) -> Option<i32> {
        self.0.code()
    }
}

impl<T> Debug for GenericError<T>
where
    T: ErrorDescription,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(code) = self.0.code() {
            write!(f, "GenericError({}): {} ({})", self.error_name(), self.0.description(), code)
        } else {
            write!(f, "GenericError({}): {}", self.error_name(), self.0.description())
        }
    }
}

impl<T> Display for GenericError<T>
where
    T: ErrorDescription,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.description())
    }
}

impl<T> Error for GenericError<T>
where
    T: ErrorDescription,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

impl<T> From<T> for GenericError<T>
where
    T: ErrorDescription,
{
    fn from(err: T) -> Self {
        Self::new(err)
    }
}

/// Failures talking to the engine or handling what it returned.
#[non_exhaustive]
#[derive(Debug)]
pub enum ClientErrorDescription {
    Transport(reqwest::Error),
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    Encode(serde_json::Error),
    Archive(zip::result::ZipError),
    EmptyArchive,
    Dump(std::io::Error),
    Playback(String),
    UnexpectedCall {
        endpoint: &'static str,
        call: &'static str,
    },
}

impl ErrorDescription for ClientErrorDescription {
    #[allow(refining_impl_trait)]
    fn description(&self) -> String {
        match self {
            Self::Transport(e) => format!("Request to engine failed: {}", e),
            Self::Status { endpoint, status, body } => {
                format!("{} returned {}: {}", endpoint, status, body.trim())
            },
            Self::Encode(e) => format!("Failed to encode request body: {}", e),
            Self::Archive(e) => format!("Unreadable waveform archive: {}", e),
            Self::EmptyArchive => "Waveform archive has no members".to_string(),
            Self::Dump(e) => format!("Failed to write dump: {}", e),
            Self::Playback(msg) => format!("Playback failed: {}", msg),
            Self::UnexpectedCall { endpoint, call } => {
                format!("{} cannot handle a {} call", endpoint, call)
            },
        }
    }

    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Archive(e) => Some(e),
            Self::Dump(e) => Some(e),
            _ => None,
        }
    }
}

pub type ClientError = GenericError<ClientErrorDescription>;

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(ClientErrorDescription::Transport(err))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ClientErrorDescription::Encode(err))
    }
}

impl From<zip::result::ZipError> for ClientError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::new(ClientErrorDescription::Archive(err))
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ClientErrorDescription::Dump(err))
    }
}

/// Failures turning raw input into speech lines. All of them end the run.
#[non_exhaustive]
#[derive(Debug)]
pub enum IngestErrorDescription {
    NoInput,
    Unreadable {
        from_stdin: bool,
    },
    InvalidLineNumber,
    Io(std::io::Error),
}

impl ErrorDescription for IngestErrorDescription {
    #[allow(refining_impl_trait)]
    fn description(&self) -> &'static str {
        match self {
            Self::NoInput => "[Error] No input.",
            Self::Unreadable { from_stdin: true } => "[Error] Unreadable string(s) came from stdin.",
            Self::Unreadable { from_stdin: false } => "[Error] Unreadable string(s) appeared in file.",
            Self::InvalidLineNumber => "[Error] -n/--line-numbers has invalid index.",
            Self::Io(_) => "[Error] Failed to read input.",
        }
    }

    fn code(&self) -> Option<i32> {
        Some(1)
    }

    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

pub type IngestError = GenericError<IngestErrorDescription>;

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        Self::new(IngestErrorDescription::Io(err))
    }
}
