use std::fs;

use anyhow::{anyhow, Result};

/// Resolves the positional file / `--text` pair the paste-style commands take.
pub fn read_input(file: Option<String>, text: Option<String>) -> Result<String> {
    match (file, text) {
        (_, Some(text)) if !text.trim().is_empty() => Ok(text),
        (Some(path), _) => Ok(String::from_utf8_lossy(&fs::read(&path)?).into_owned()),
        _ => Err(anyhow!("provide a file path or --text")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn inline_text_wins_over_file() {
        let got = read_input(Some("ignored.txt".to_string()), Some("inline".to_string())).unwrap();
        assert_eq!(got, "inline");
    }

    #[test]
    fn reads_from_file_when_no_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note.txt");
        fs::write(&path, "from file").unwrap();
        let got = read_input(Some(path.to_string_lossy().into_owned()), None).unwrap();
        assert_eq!(got, "from file");
    }

    #[test]
    fn neither_is_an_error() {
        assert!(read_input(None, None).is_err());
    }
}
