//! Small helpers for reading tabular inputs and anchoring user supplied paths

use std::{
    env,
    io::BufRead,
    path::{Path, PathBuf},
};

use anyhow::Context;

/// Fields of the next line holding anything other than white space, split on tabs.
///
/// Surrounding white space is trimmed from the line (not from each field).  Returns
/// `None` at end of input
pub fn next_fields<'a, R: BufRead>(
    rdr: &mut R,
    buf: &'a mut String,
) -> anyhow::Result<Option<Vec<&'a str>>> {
    loop {
        buf.clear();
        if rdr.read_line(buf)? == 0 {
            return Ok(None);
        }
        if !buf.trim().is_empty() {
            break;
        }
    }
    Ok(Some(buf.trim().split('\t').collect()))
}

/// Make a path absolute relative to the current directory without touching the file system.
/// The path does not need to exist
pub fn abs_path<P: AsRef<Path>>(p: P) -> anyhow::Result<PathBuf> {
    let p = p.as_ref();
    if p.is_absolute() {
        Ok(p.to_owned())
    } else {
        let cwd = env::current_dir().with_context(|| "Could not get current directory")?;
        Ok(cwd.join(p))
    }
}

/// Absolute path as a string for storing in the configuration record
pub fn abs_path_string<P: AsRef<Path>>(p: P) -> anyhow::Result<String> {
    abs_path(p).map(|p| p.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_skipped() {
        let mut rdr = "\n  \nname\tcondition \n\n\tx\ty\n".as_bytes();
        let mut buf = String::new();
        assert_eq!(
            next_fields(&mut rdr, &mut buf).unwrap(),
            Some(vec!["name", "condition"])
        );
        assert_eq!(next_fields(&mut rdr, &mut buf).unwrap(), Some(vec!["x", "y"]));
        assert_eq!(next_fields(&mut rdr, &mut buf).unwrap(), None);
    }

    #[test]
    fn relative_paths_are_anchored_at_cwd() {
        let cwd = env::current_dir().unwrap();
        assert_eq!(abs_path("a/b.vcf").unwrap(), cwd.join("a/b.vcf"));
        assert_eq!(abs_path("/data/x").unwrap(), PathBuf::from("/data/x"));
    }
}
