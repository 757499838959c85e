use tempfile::TempDir;

use crate::config::DEFAULT_RESULT_LIMIT;
use crate::library::{Library, LibrarySource, NewItem};

/// A migrated library in a fresh temporary directory. Keep the `TempDir`
/// alive for as long as the library is used.
pub fn open_library() -> (TempDir, LibrarySource, Library) {
    let dir = tempfile::tempdir().unwrap();
    let source = LibrarySource::create(dir.path().join("library.db"), DEFAULT_RESULT_LIMIT).unwrap();
    let library = source.get().unwrap();

    (dir, source, library)
}

pub fn new_item(external_id: &str, name: &str, artist: &str, album: &str) -> NewItem {
    NewItem {
        external_id: external_id.to_string(),
        name: name.to_string(),
        artist: artist.to_string(),
        album: album.to_string(),
        ..Default::default()
    }
}
