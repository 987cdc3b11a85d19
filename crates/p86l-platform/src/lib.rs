//! Platform-specific application directories for the Project 86 launcher.

mod paths;

pub use paths::{APP_DIR_NAME, AppPaths, AppPathsError, PathProvider};
