use anyhow::Result;
use std::env;
use std::path::PathBuf;

/// Determines the project store path to use based on the available information
pub fn determine_store_path(file_option: Option<&str>) -> Result<PathBuf> {
    // Priority 1: explicit --file option
    if let Some(file) = file_option {
        return Ok(PathBuf::from(file));
    }

    // Priority 2: REQFLOW_FILE environment variable
    if let Ok(env_path) = env::var("REQFLOW_FILE") {
        if !env_path.is_empty() {
            return Ok(PathBuf::from(env_path));
        }
    }

    // Priority 3: reqflow.yaml in the current directory
    let current_dir_path = PathBuf::from("reqflow.yaml");
    if current_dir_path.exists() {
        return Ok(current_dir_path);
    }

    // Priority 4: the default store in the user's data directory
    let data_dir = dirs::data_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine user data directory"))?;
    Ok(data_dir.join("reqflow").join("reqflow.yaml"))
}

/// Where pending resolution sessions are saved between `plan` and `apply`
pub fn session_path_for(store_path: &std::path::Path) -> PathBuf {
    store_path.with_extension("session.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_file_wins() {
        let path = determine_store_path(Some("/tmp/custom.yaml")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/custom.yaml"));
    }

    #[test]
    fn test_session_path_sits_next_to_store() {
        let session = session_path_for(std::path::Path::new("/data/proj/reqflow.yaml"));
        assert_eq!(session, PathBuf::from("/data/proj/reqflow.session.yaml"));
    }
}
