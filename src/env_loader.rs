use crate::chatlog::paths::chatlog_home;
use std::env;
use std::path::PathBuf;

const DOTENV_FILE: &str = ".env";

fn home_dotenv_path(custom_home: Option<&str>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    chatlog_home(custom_home, home_dir).map(|home| home.join(DOTENV_FILE))
}

/// Loads `.env` from the working directory (or a parent), else from the
/// chatlog home. Variables already set in the environment are kept.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let custom_home = env::var("CHATLOG_HOME").ok();
    if let Some(path) = home_dotenv_path(custom_home.as_deref(), dirs::home_dir())
        && path.is_file()
    {
        let _ = dotenvy::from_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::home_dotenv_path;
    use std::path::PathBuf;

    #[test]
    fn dotenv_lives_in_explicit_chatlog_home() {
        let got = home_dotenv_path(Some("/srv/chatlog"), Some(PathBuf::from("/home/operator")));
        assert_eq!(got, Some(PathBuf::from("/srv/chatlog/.env")));
    }

    #[test]
    fn dotenv_defaults_to_dot_chatlog_under_home() {
        let got = home_dotenv_path(None, Some(PathBuf::from("/home/operator")));
        assert_eq!(got, Some(PathBuf::from("/home/operator/.chatlog/.env")));
    }

    #[test]
    fn no_dotenv_without_any_home() {
        assert_eq!(home_dotenv_path(None, None), None);
    }
}
