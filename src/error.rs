use std::fmt;

/// Resource failures a caller can meaningfully react to. Sequencing
/// mistakes (beginning a page while one is open, drawing after the
/// session finished) are contract violations and assert instead.
#[derive(Debug)]
pub enum PrintError {
    PreviewAllocation(String),
    Image(String),
    Io(std::io::Error),
}

impl fmt::Display for PrintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrintError::PreviewAllocation(message) => {
                write!(f, "preview raster cannot be allocated: {}", message)
            }
            PrintError::Image(message) => write!(f, "image error: {}", message),
            PrintError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for PrintError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PrintError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PrintError {
    fn from(value: std::io::Error) -> Self {
        PrintError::Io(value)
    }
}
