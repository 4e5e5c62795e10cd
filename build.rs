use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const KEY_PREFIX: &str = "STUBSYNC_";
const ALLOWLIST_FILE: &str = "stubsync_env_allowlist.rs";

fn rust_sources(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pending = vec![root.to_path_buf()];
    let mut found = Vec::new();
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Every `STUBSYNC_*` token in `text`, read up to the first character that
/// cannot appear in an environment key.
fn env_keys_in(text: &str) -> impl Iterator<Item = String> + '_ {
    text.match_indices(KEY_PREFIX).filter_map(move |(start, _)| {
        let tail = &text[start + KEY_PREFIX.len()..];
        let len = tail
            .find(|c: char| !(c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'))
            .unwrap_or(tail.len());
        (len > 0).then(|| text[start..start + KEY_PREFIX.len() + len].to_string())
    })
}

fn render_allowlist(keys: &BTreeSet<String>) -> String {
    let mut out = String::from("pub const GENERATED_STUBSYNC_ENV_ALLOWLIST: &[&str] = &[\n");
    for key in keys {
        out.push_str(&format!("    {key:?},\n"));
    }
    out.push_str("];\n");
    out
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut keys = BTreeSet::new();
    for file in rust_sources(Path::new("src"))? {
        keys.extend(env_keys_in(&fs::read_to_string(&file)?));
    }
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    fs::write(out_dir.join(ALLOWLIST_FILE), render_allowlist(&keys))?;

    let stamp = SystemTime::now().duration_since(UNIX_EPOCH)?;
    println!(
        "cargo:rustc-env=STUBSYNC_BUILD_ID={}.{:09}",
        stamp.as_secs(),
        stamp.subsec_nanos()
    );
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
    Ok(())
}
