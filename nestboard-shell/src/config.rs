/// Config location for the shell.
/// Reads config.json from ~/.config/nestboard/config.json (or platform equivalent).
use std::path::PathBuf;

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nestboard")
        .join("config.json")
}

/// Explicit path from the command line, else the default location.
pub fn resolve_config_path(arg: Option<String>) -> PathBuf {
    arg.map(PathBuf::from).unwrap_or_else(default_config_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_path_ends_with_app_dir() {
        let path = default_config_path();
        assert!(path.ends_with("nestboard/config.json"));
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = resolve_config_path(Some("/tmp/board.json".to_string()));
        assert_eq!(path, PathBuf::from("/tmp/board.json"));
    }
}
