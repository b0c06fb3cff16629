//! Process-level error type.
//!
//! Every failure that reaches `main` is an `AppError`: a user-facing message
//! plus the exit code the binary should terminate with.
//!
//! - `2`: local input problems (missing file, wrong extension, no JSON fence, IO)
//! - `3`: the Markdown payload could not be parsed
//! - `4`: backend, network, or terminal failures

pub const EXIT_INPUT: u8 = 2;
pub const EXIT_PARSE: u8 = 3;
pub const EXIT_BACKEND: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::new(EXIT_INPUT, message)
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(EXIT_BACKEND, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
