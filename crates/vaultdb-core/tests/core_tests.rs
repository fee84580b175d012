use std::collections::{HashMap, HashSet};
use std::fs;

use tempfile::TempDir;

use vaultdb_core::settings::VaultSettings;
use vaultdb_core::vault::VaultReader;
use vaultdb_core::{Chunker, ChunkingConfig};

fn squash(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn write_vault(dir: &std::path::Path) {
    fs::create_dir_all(dir.join("projects")).unwrap();
    fs::write(
        dir.join("Augmented Language Models.md"),
        "Retrieval augmented generation combines retrieval with generation.",
    )
    .unwrap();
    let mut long = String::from("# Bandits\n\n");
    for i in 0..20 {
        long.push_str(&format!("Example {i}: bandits in industry pick arms and observe rewards over time.\n\n"));
    }
    fs::write(dir.join("projects/Bandits.md"), long).unwrap();
    fs::write(dir.join("projects/Empty.md"), "\n\n").unwrap();
}

#[test]
fn vault_to_chunks_without_overlap_reconstructs_notes() {
    let tmp = TempDir::new().unwrap();
    write_vault(tmp.path());

    let notes = VaultReader::new(tmp.path(), VaultSettings::default()).read_notes().expect("notes");
    assert_eq!(notes.len(), 3);

    let config = ChunkingConfig { max_chars: 300, overlap_chars: 0, min_chars: 100, ..ChunkingConfig::default() };
    let chunks = Chunker::new(config).unwrap().chunk_notes(&notes).expect("chunks");

    let ids: HashSet<_> = chunks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids.len(), chunks.len(), "chunk ids are unique");

    let mut by_note: HashMap<&str, String> = HashMap::new();
    for c in &chunks {
        by_note.entry(c.note_path.as_str()).or_default().push_str(&c.text);
    }
    assert!(!by_note.contains_key("projects/Empty.md"), "empty notes produce no chunks");
    for note in notes.iter().filter(|n| !n.text.trim().is_empty()) {
        assert_eq!(squash(&by_note[note.path.as_str()]), squash(&note.text), "{}", note.path);
    }
}

#[test]
fn rebuild_yields_identical_chunks() {
    let tmp = TempDir::new().unwrap();
    write_vault(tmp.path());
    let reader = VaultReader::new(tmp.path(), VaultSettings::default());
    let chunker = Chunker::new(ChunkingConfig { max_chars: 200, overlap_chars: 40, min_chars: 50, ..ChunkingConfig::default() }).unwrap();

    let first = chunker.chunk_notes(&reader.read_notes().unwrap()).unwrap();
    let second = chunker.chunk_notes(&reader.read_notes().unwrap()).unwrap();
    assert_eq!(first, second);
    assert!(first.iter().all(|c| c.position < c.total));
}
