#[test]
fn test_readme_deps() {
    version_sync::assert_markdown_deps_updated!("README.md");
}

#[test]
fn test_lib_doc_deps() {
    version_sync::assert_contains_regex!("src/lib.rs", "^//! teletext-io = \"~{version}\"$");
}
