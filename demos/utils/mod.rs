use std::path::PathBuf;

/// Returns the path to the sample trades file in the crate root.
pub fn sample_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("data")
        .join("sample.txt")
}
