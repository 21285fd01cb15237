use std::fs;
use std::io::{self, Write};
use std::path::Path;

use super::crypto::{ALPHA_NUM, pseudorandom_string};

/// Atomically creates a file with the given contents, overwriting
/// it if one exists.
///
/// The buffer is written to a sibling temporary file which is synced and
/// then renamed over the destination, so readers either see the old
/// contents or the new ones, never a partial write.
///
/// Read: [Ensuring data reaches to disk](https://lwn.net/Articles/457667/).
pub fn safe_write_all<P: AsRef<Path>, B: AsRef<[u8]>>(path: P, buf: B) -> io::Result<()> {
    let tmp_ext = "sync-".to_owned() + &pseudorandom_string(ALPHA_NUM, 6);
    let tmp_path = path.as_ref().with_extension(tmp_ext);
    let mut tmp_file = fs::File::create(&tmp_path)?;

    tmp_file.write_all(buf.as_ref())?;
    tmp_file.flush()?;
    tmp_file.sync_all()?;
    drop(tmp_file);

    if let Err(err) = fs::rename(&tmp_path, path.as_ref()) {
        // do not leave stray temporary files behind
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn it_replaces_existing_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("key.json");

        safe_write_all(&path, b"first").unwrap();
        safe_write_all(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        // only the destination file remains
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
