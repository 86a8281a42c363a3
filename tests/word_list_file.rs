use ocr_wordlist_rust::output::{read_result, write_result};
use ocr_wordlist_rust::{Structured, WordEntry};
use tempfile::tempdir;

#[test]
fn word_list_survives_a_rewrite() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("words.json");
    let words = Structured::Entries(vec![
        WordEntry::new("merhaba", "hello"),
        WordEntry::new("猫", "cat"),
    ]);

    write_result(&path, &words).unwrap();
    let first = std::fs::read(&path).unwrap();
    let loaded = read_result(&path).unwrap();
    assert_eq!(loaded, words);

    write_result(&path, &loaded).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), first);
    assert!(String::from_utf8(first).unwrap().contains("\"猫\""));
}

#[test]
fn sentinel_file_reads_back_as_failed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("words.json");
    write_result(&path, &Structured::Failed).unwrap();
    assert!(read_result(&path).unwrap().is_failed());
}
