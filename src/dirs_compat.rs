use std::path::PathBuf;

const APP_DIR: &str = "InnerSight";

pub fn data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("INNERSIGHT_DATA_DIR") {
        if !dir.trim().is_empty() {
            return Some(PathBuf::from(dir));
        }
    }

    if let Ok(data_dir) = std::env::var("XDG_DATA_HOME") {
        if !data_dir.is_empty() {
            return Some(PathBuf::from(data_dir).join(APP_DIR));
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".local").join("share").join(APP_DIR));
    }

    None
}
