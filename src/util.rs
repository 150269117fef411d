use anyhow::{bail, Context};
use std::{fs, path::Path};


pub fn read_to_string<P: AsRef<Path>>(p: P) -> anyhow::Result<String> {
    fs::read_to_string(&p).with_context(|| format!("read file {:?}", p.as_ref()))
}


/// The configured system prompt file, or the built-in default when none is given.
pub fn load_system_prompt(path: Option<&Path>, default: &str) -> anyhow::Result<String> {
    let Some(path) = path else { return Ok(default.to_string()) };
    let text = read_to_string(path)?;
    let text = text.trim();
    if text.is_empty() {
        bail!("system prompt file {:?} is empty", path);
    }
    Ok(text.to_string())
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_when_unset() {
        assert_eq!(load_system_prompt(None, "coach").unwrap(), "coach");
    }

    #[test]
    fn file_contents_trimmed() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "  You are a strict interviewer.  ").unwrap();
        assert_eq!(load_system_prompt(Some(f.path()), "coach").unwrap(), "You are a strict interviewer.");
    }

    #[test]
    fn empty_file_rejected() {
        let f = tempfile::NamedTempFile::new().unwrap();
        assert!(load_system_prompt(Some(f.path()), "coach").is_err());
    }
}
