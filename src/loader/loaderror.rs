use std::error::Error;
use std::fmt::{self, Display};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum LoadError {
    NotFound {
        path: String,
        searched: Vec<PathBuf>,
    },
    Io {
        path: PathBuf,
        message: String,
    },
}

impl Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::NotFound { path, searched } => {
                write!(f, "could not resolve import \"{path}\", searched:")?;
                for dir in searched {
                    write!(f, "\n  {}", dir.display())?;
                }
                Ok(())
            }
            LoadError::Io { path, message } => {
                write!(f, "failed to read \"{}\": {message}", path.display())
            }
        }
    }
}

impl Error for LoadError {}
