use std::ffi::OsString;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Clinicore";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Overrides the database location when set.
pub const DB_PATH_ENV: &str = "CLINICORE_DB_PATH";

const DATABASE_FILE: &str = "clinicore.db";

/// Get the application data directory
/// ~/Clinicore/ on all platforms; falls back to the working directory when
/// no home directory can be resolved.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Path of the SQLite database file.
pub fn database_path() -> PathBuf {
    resolve_database_path(std::env::var_os(DB_PATH_ENV))
}

fn resolve_database_path(override_path: Option<OsString>) -> PathBuf {
    match override_path {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => app_data_dir().join(DATABASE_FILE),
    }
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "clinicore=debug,warn"
    } else {
        "clinicore=info,warn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with("Clinicore"));
    }

    #[test]
    fn database_path_defaults_under_app_data() {
        let path = resolve_database_path(None);
        assert!(path.starts_with(app_data_dir()));
        assert!(path.ends_with(DATABASE_FILE));

        let empty = resolve_database_path(Some(OsString::new()));
        assert_eq!(empty, path);
    }

    #[test]
    fn database_path_override_is_used_verbatim() {
        let path = resolve_database_path(Some("/srv/clinic/records.db".into()));
        assert_eq!(path, PathBuf::from("/srv/clinic/records.db"));
    }

    #[test]
    fn log_filter_targets_this_crate() {
        assert!(default_log_filter().starts_with("clinicore="));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
