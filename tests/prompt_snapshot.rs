use ocr_wordlist_rust::structuring::render_prompt;

#[test]
fn extraction_prompt_snapshot() {
    let prompt = render_prompt("Hallo Welt\nGuten Morgen").unwrap();
    insta::assert_snapshot!(prompt);
}
