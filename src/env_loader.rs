use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(stubsync_home: Option<PathBuf>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    match (stubsync_home, home_dir) {
        (Some(home), _) => Some(home.join(".env")),
        (None, Some(home)) => Some(home.join(".stubsync/.env")),
        (None, None) => None,
    }
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("STUBSYNC_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::fallback_dotenv_path;
    use std::path::PathBuf;

    #[test]
    fn fallback_prefers_stubsync_home() {
        let got = fallback_dotenv_path(
            Some(PathBuf::from("/srv/stubsync")),
            Some(PathBuf::from("/home/alice")),
        );
        assert_eq!(got, Some(PathBuf::from("/srv/stubsync/.env")));
    }

    #[test]
    fn fallback_uses_dot_dir_under_home() {
        let got = fallback_dotenv_path(None, Some(PathBuf::from("/home/alice")));
        assert_eq!(got, Some(PathBuf::from("/home/alice/.stubsync/.env")));
    }

    #[test]
    fn fallback_is_none_without_any_home() {
        assert_eq!(fallback_dotenv_path(None, None), None);
    }
}
