mod layout;
mod paths;
mod platform;

pub use layout::InstallTarget;
pub use paths::{AppPaths, AppPathsError};
pub use platform::{Platform, UnsupportedPlatform};
