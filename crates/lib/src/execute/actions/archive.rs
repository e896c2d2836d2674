//! Gzip tarball unpacking and creation.

use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Component, Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tar::{Archive, Builder, EntryType, Header};
use tracing::debug;
use walkdir::WalkDir;

use super::ActionError;

/// Unpack `archive` into `dest`, dropping the first `strip` path components of every entry.
///
/// Entries that would escape `dest` are skipped.
pub fn unpack_tar_gz(archive: &Path, dest: &Path, strip: usize) -> Result<(), ActionError> {
  let archive_error = |e: std::io::Error| ActionError::Archive {
    path: archive.to_path_buf(),
    message: e.to_string(),
  };

  let file = File::open(archive).map_err(archive_error)?;
  let mut tar = Archive::new(GzDecoder::new(BufReader::new(file)));
  fs::create_dir_all(dest)?;

  let mut count = 0usize;
  for entry in tar.entries().map_err(archive_error)? {
    let mut entry = entry.map_err(archive_error)?;
    let path = entry.path().map_err(archive_error)?;

    let stripped: PathBuf = path.components().skip(strip).collect();
    if stripped.as_os_str().is_empty() {
      continue;
    }
    if stripped.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
      debug!(entry = ?stripped, "skipping entry outside destination");
      continue;
    }

    let dest_path = dest.join(&stripped);
    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent)?;
    }

    entry.unpack(&dest_path).map_err(archive_error)?;
    count += 1;
  }

  debug!(archive = ?archive, dest = ?dest, entries = count, "unpacked");
  Ok(())
}

/// Write a gzip tarball of the `members` of `src_dir` to `out`.
///
/// Entries are sorted and carry zero timestamps and ownership, so equal trees give equal
/// archives. Every member must exist.
pub fn create_tar_gz<W: Write>(src_dir: &Path, members: &[&str], out: W) -> Result<W, ActionError> {
  let mut builder = Builder::new(GzEncoder::new(out, Compression::default()));

  for member in members {
    let root = src_dir.join(member);
    if !root.exists() {
      return Err(ActionError::Archive {
        path: root,
        message: "missing archive member".to_string(),
      });
    }

    let mut entries: Vec<PathBuf> = WalkDir::new(&root)
      .follow_links(false)
      .into_iter()
      .filter_map(Result::ok)
      .map(|e| e.into_path())
      .collect();
    entries.sort();

    for path in entries {
      let rel = path
        .strip_prefix(src_dir)
        .unwrap_or(&path)
        .to_string_lossy()
        .replace('\\', "/");
      append_entry(&mut builder, &path, &rel)?;
    }
  }

  let encoder = builder.into_inner()?;
  Ok(encoder.finish()?)
}

fn append_entry<W: Write>(builder: &mut Builder<W>, path: &Path, rel: &str) -> Result<(), ActionError> {
  let md = fs::symlink_metadata(path)?;

  let mut header = Header::new_gnu();
  header.set_mtime(0);
  header.set_uid(0);
  header.set_gid(0);
  header.set_mode(mode(&md));

  if md.is_dir() {
    header.set_entry_type(EntryType::Directory);
    header.set_size(0);
    header.set_cksum();
    builder.append_data(&mut header, rel, std::io::empty())?;
  } else if md.file_type().is_symlink() {
    let target = fs::read_link(path)?;
    header.set_entry_type(EntryType::Symlink);
    header.set_size(0);
    builder.append_link(&mut header, rel, target)?;
  } else {
    header.set_entry_type(EntryType::Regular);
    header.set_size(md.len());
    header.set_cksum();
    builder.append_data(&mut header, rel, File::open(path)?)?;
  }

  Ok(())
}

#[cfg(unix)]
fn mode(md: &fs::Metadata) -> u32 {
  use std::os::unix::fs::PermissionsExt;
  md.permissions().mode()
}

#[cfg(not(unix))]
fn mode(md: &fs::Metadata) -> u32 {
  if md.is_dir() { 0o755 } else { 0o644 }
}
